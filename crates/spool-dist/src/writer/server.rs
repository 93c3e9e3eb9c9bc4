//! Server-side writer handler.
//!
//! Requires the first request to carry the keys to lock, opens the engine
//! writer session for them, and wires `receiver -> local writer -> sender`
//! under a supervised group. A rejected open (another writer holds a key)
//! is reported to the peer as an error response before the stream closes.

use std::sync::Arc;

use spool_core::NodeId;
use spool_engine::Engine;
use spool_flow::{Pipeline, StreamReceiver, StreamSender, TaskGroup};
use spool_cluster::{ServerStream, StreamTransport};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DistError;
use crate::writer::local::LocalWriter;
use crate::writer::protocol::{Request, Response};

/// Registers this node's writer handler on the transport.
pub fn serve_writer(
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
    let first = match stream.requests.recv().await {
        Some(request) => request,
        None => return Ok(()),
    };
    if first.open_keys.is_empty() {
        let _ = stream
            .responses
            .send(Response::error("expected open keys on the first request"))
            .await;
        return Err(
            DistError::Protocol("writer stream did not begin with open keys".into()).into(),
        );
    }
    debug!(%host, keys = ?first.open_keys.strings(), "serving writer stream");

    let mut local = match LocalWriter::open("local", &engine, &first.open_keys).await {
        Ok(local) => local,
        Err(err) => {
            let _ = stream.responses.send(Response::error(err.to_string())).await;
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
