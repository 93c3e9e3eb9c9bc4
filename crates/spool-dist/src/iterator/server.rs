//! Server-side iterator handler.
//!
//! For each accepted stream: require an open request, stand up a local
//! iterator client over the requested keys and range, and wire
//! `receiver -> local client -> sender` under a supervised group. The
//! handler exits when the peer closes its send side or the group is
//! cancelled; both paths tear down identically.

use std::sync::Arc;

use spool_core::NodeId;
use spool_engine::Engine;
use spool_flow::{Pipeline, StreamReceiver, StreamSender, TaskGroup};
use spool_cluster::{ServerStream, StreamTransport};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DistError;
use crate::iterator::local::LocalIterator;
use crate::iterator::protocol::{Command, Request, Response};

/// Registers this node's iterator handler on the transport.
pub fn serve_iterator(
    host: NodeId,
    engine: Arc<dyn Engine>,
    transport: &dyn StreamTransport<Request, Response>,
) {
    transport.handle(Arc::new(move |stream| {
        let engine = engine.clone();
        Box::pin(handle(host, engine, stream))
    }));
}

async fn handle(
    host: NodeId,
    engine: Arc<dyn Engine>,
    mut stream: ServerStream<Request, Response>,
) -> anyhow::Result<()> {
    // The first request provides the context for opening the engine
    // iterator; anything else is a protocol error.
    let first = match stream.requests.recv().await {
        Some(request) => request,
        None => return Ok(()),
    };
    if first.command != Command::Open {
        let _ = stream
            .responses
            .send(Response::nack(host, first.command, "expected an open request"))
            .await;
        return Err(
            DistError::Protocol("iterator stream did not begin with an open request".into()).into(),
        );
    }
    debug!(%host, keys = ?first.keys.strings(), "serving iterator stream");

    let mut local = match LocalIterator::open("local", &engine, host, first.range, &first.keys).await
    {
        Ok(local) => local,
        Err(err) => {
            let _ = stream
                .responses
                .send(Response::nack(host, Command::Open, err.to_string()))
                .await;
            return Err(err.into());
        }
    };

    let mut receiver = StreamReceiver::new("receiver", stream.requests);
    let mut sender = StreamSender::new("sender", stream.responses);

    let mut pipe = Pipeline::new();
    pipe.route_unary(&mut receiver, &mut local, 1);
    pipe.route_unary(&mut local, &mut sender, 1);
    pipe.set(Box::new(receiver))?;
    pipe.set(Box::new(local))?;
    pipe.set(Box::new(sender))?;

    let mut group = TaskGroup::new(CancellationToken::new());
    pipe.start(&mut group);
    group.wait().await
}
