//! The distributed writer.
//!
//! Opening a writer classifies the key set by leaseholder, opens a remote
//! client per target node and a local writer if the host holds any leases,
//! and wires them behind two stateless switches:
//!
//! ```text
//! input -> remote/local switch -> {node switch ->(per node) remote*, local}
//! {remote*, local} -> merged output
//! ```
//!
//! The destination of every segment is a pure function of its key, so no
//! coordinator is needed. Closing the input stream drains the pipeline;
//! `wait` returns once every client has exited.

mod local;
mod protocol;
mod remote;
mod server;

pub use protocol::{Request, Response};
pub use server::serve_writer;

use std::collections::BTreeMap;
use std::sync::Arc;

use spool_cluster::{resolve_address_map, HostResolver, StreamTransport};
use spool_core::{Address, BatchFactory, Keys, Lease, NodeId};
use spool_engine::Engine;
use spool_flow::{stream, BatchSwitch, Inlet, Node, Outlet, Pipeline, Sink, Source, TaskGroup};
use tokio_util::sync::CancellationToken;

use crate::channel::Service;
use crate::error::DistError;
use crate::frame::Segment;
use crate::iterator::validate_channel_keys;
use local::LocalWriter;
use remote::RemoteWriter;

/// The transport writer streams ride on.
pub type WriterTransport = dyn StreamTransport<Request, Response>;

const LOCAL_ADDR: &str = "local";
const REMOTE_ADDR: &str = "remote";

/// A client-facing write handle that fans segments out to their
/// leaseholders.
pub struct SegmentWriter {
    group: TaskGroup,
}

impl std::fmt::Debug for SegmentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentWriter").finish_non_exhaustive()
    }
}

impl SegmentWriter {
    /// Opens a writer over `keys`, reading requests from `input` and
    /// merging responses into `output`. Fails with a locked error if any
    /// channel is held by another writer.
    pub async fn open(
        engine: Arc<dyn Engine>,
        service: &Service,
        resolver: Arc<dyn HostResolver>,
        transport: Arc<WriterTransport>,
        keys: Keys,
        input: Outlet<Request>,
        output: Inlet<Response>,
    ) -> Result<SegmentWriter, DistError> {
        validate_channel_keys(service, &keys).await?;

        let host = resolver.host_id();
        let batch = BatchFactory::new(host).batch(keys.iter().copied());
        let mut pipe = Pipeline::new();

        let mut local = match batch.has_local() {
            true => Some(
                LocalWriter::open(LOCAL_ADDR, &engine, &Keys::new(batch.local.clone())).await?,
            ),
            false => None,
        };

        let mut remotes = Vec::with_capacity(batch.remote.len());
        let mut node_switch = match batch.has_remote() {
            true => {
                let addresses = resolve_address_map(resolver.as_ref(), batch.remote_node_ids())?;
                for (node_id, node_keys) in &batch.remote {
                    remotes.push(
                        RemoteWriter::open(
                            writer_addr(*node_id),
                            &transport,
                            &addresses[node_id],
                            *node_id,
                            Keys::new(node_keys.clone()),
                        )
                        .await?,
                    );
                }
                // Fan each segment out to the client for its leaseholder.
                let mut switch = BatchSwitch::new("node-switch", |request: Request| {
                    let mut by_node: BTreeMap<NodeId, Vec<Segment>> = BTreeMap::new();
                    for segment in request.segments {
                        by_node.entry(segment.lease()).or_default().push(segment);
                    }
                    by_node
                        .into_iter()
                        .map(|(node_id, segments)| {
                            (writer_addr(node_id), Request::data(segments))
                        })
                        .collect()
                });
                for client in remotes.iter_mut() {
                    let (tx, rx) = stream(1);
                    switch.out_to_addr(client.address().clone(), tx);
                    client.in_from(rx);
                }
                Some(switch)
            }
            false => None,
        };

        // Route the caller's input. With both sides present a remote/local
        // switch partitions each request's segments against the host.
        match (local.as_mut(), node_switch.as_mut()) {
            (Some(local), Some(node_switch)) => {
                let mut rls = BatchSwitch::new("remote-local-switch", move |request: Request| {
                    let (local_segs, remote_segs): (Vec<Segment>, Vec<Segment>) = request
                        .segments
                        .into_iter()
                        .partition(|segment| segment.lease() == host);
                    let mut routed = Vec::with_capacity(2);
                    if !local_segs.is_empty() {
                        routed.push((Address::from(LOCAL_ADDR), Request::data(local_segs)));
                    }
                    if !remote_segs.is_empty() {
                        routed.push((Address::from(REMOTE_ADDR), Request::data(remote_segs)));
                    }
                    routed
                });
                rls.in_from(input);
                let (local_tx, local_rx) = stream(1);
                rls.out_to_addr(LOCAL_ADDR, local_tx);
                local.in_from(local_rx);
                let (remote_tx, remote_rx) = stream(1);
                rls.out_to_addr(REMOTE_ADDR, remote_tx);
                node_switch.in_from(remote_rx);
                pipe.set(Box::new(rls))?;
            }
            (None, Some(node_switch)) => node_switch.in_from(input),
            (Some(local), None) => local.in_from(input),
            (None, None) => return Err(DistError::NotFound("empty key set".into())),
        }

        // Merge every client's responses into the caller's output stream.
        if let Some(local) = local.as_mut() {
            local.out_to(output.clone());
        }
        for client in remotes.iter_mut() {
            client.out_to(output.clone());
        }
        drop(output);

        if let Some(node_switch) = node_switch {
            pipe.set(Box::new(node_switch))?;
        }
        for client in remotes {
            pipe.set(Box::new(client))?;
        }
        if let Some(local) = local {
            pipe.set(Box::new(local))?;
        }

        let mut group = TaskGroup::new(CancellationToken::new());
        pipe.start(&mut group);
        Ok(SegmentWriter { group })
    }

    /// Completes once the input stream has closed and every client has
    /// drained, surfacing the first pipeline error.
    pub async fn wait(&mut self) -> Result<(), DistError> {
        self.group.wait().await.map_err(DistError::Other)
    }

    /// Aborts the pipeline without waiting for the drain.
    pub fn cancel(&self) {
        self.group.cancel();
    }
}

fn writer_addr(node_id: NodeId) -> Address {
    Address::from(format!("writer-{node_id}"))
}
