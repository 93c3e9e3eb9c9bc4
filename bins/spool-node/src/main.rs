//! # Spool Node - Cluster Node Bootstrap
//!
//! Starts a single spool node: the storage engine, the transport server,
//! the channel service, and the iterator/writer handlers that serve remote
//! peers. Membership is fed from the command line; the gossip substrate
//! this stands in for is outside the distribution layer.
//!
//! ## Usage
//!
//! ```bash
//! # A two-node cluster on one machine
//! spool-node start --node-id 1 --listen-address 127.0.0.1:9090 \
//!     --peer-addresses 2=127.0.0.1:9091 --mem
//! spool-node start --node-id 2 --listen-address 127.0.0.1:9091 \
//!     --peer-addresses 1=127.0.0.1:9090 --mem
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spool_cluster::tcp::{TcpServer, TcpStreamTransport, TcpUnaryTransport};
use spool_cluster::{HostResolver, StaticCluster};
use spool_core::{Address, NodeId};
use spool_dist::channel::{CreateMessage, Service, SharedStore};
use spool_dist::{iterator, writer};
use spool_engine::{Engine, MemEngine};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "spool-node")]
#[command(about = "Clustered time-series database node")]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Start a node and serve peers until interrupted.
    Start(StartArgs),
}

#[derive(clap::Args, Debug)]
struct StartArgs {
    /// Address to accept peer connections on.
    #[arg(long)]
    listen_address: String,

    /// This node's cluster identity.
    #[arg(long)]
    node_id: u32,

    /// Peer membership entries, as `id=host:port`.
    #[arg(long, value_delimiter = ',')]
    peer_addresses: Vec<String>,

    /// Directory for persistent storage.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Run the storage engine in memory.
    #[arg(long)]
    mem: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    match args.command {
        Cmd::Start(start) => run(start).await,
    }
}

async fn run(args: StartArgs) -> Result<()> {
    let host = NodeId(args.node_id);
    let listen = Address::from(args.listen_address.clone());

    if args.data.is_some() && !args.mem {
        warn!("no persistent engine is wired into this build; running in memory");
    }

    let mut cluster = StaticCluster::new(host).with_member(host, listen.clone());
    for entry in &args.peer_addresses {
        let (id, addr) = parse_peer(entry)?;
        cluster = cluster.with_member(id, addr);
    }
    let resolver: Arc<dyn HostResolver> = Arc::new(cluster);

    let engine: Arc<dyn Engine> = Arc::new(MemEngine::new());
    let store = Arc::new(SharedStore::new());

    let server = TcpServer::new();
    let create_transport: Arc<spool_dist::channel::CreateTransport> = Arc::new(
        TcpUnaryTransport::<CreateMessage, CreateMessage>::new(&server, "channel.create"),
    );
    let iter_transport = TcpStreamTransport::<iterator::Request, iterator::Response>::new(
        &server,
        "segment.iterator",
    );
    let writer_transport =
        TcpStreamTransport::<writer::Request, writer::Response>::new(&server, "segment.writer");

    let _service = Service::new(resolver.clone(), store, engine.clone(), create_transport);
    iterator::serve_iterator(host, engine.clone(), &iter_transport);
    writer::serve_writer(host, engine.clone(), &writer_transport);

    info!(%host, %listen, peers = args.peer_addresses.len(), "node started");

    let shutdown = CancellationToken::new();
    let mut serve = {
        let shutdown = shutdown.clone();
        let listen = listen.clone();
        tokio::spawn(async move { server.serve(&listen, shutdown).await })
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            shutdown.cancel();
            let _ = serve.await;
        }
        result = &mut serve => {
            result??;
        }
    }
    Ok(())
}

fn parse_peer(entry: &str) -> Result<(NodeId, Address)> {
    let (id, addr) = entry
        .split_once('=')
        .with_context(|| format!("peer entry {entry:?} is not id=host:port"))?;
    let id: u32 = id
        .parse()
        .with_context(|| format!("peer id {id:?} is not a number"))?;
    Ok((NodeId(id), Address::from(addr)))
}
