//! Transport interfaces.
//!
//! A bidirectional stream surfaces to both peers as a pair of mpsc halves:
//! the client holds `(requests in, responses out)`, the server handler the
//! mirror image. Closing the send half is the normal shutdown signal and
//! propagates to the peer as stream closure, whatever the wire underneath.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use spool_core::Address;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer could not be reached, or went away mid-stream.
    #[error("target {0} unreachable")]
    Unreachable(Address),

    #[error("connect to {0} timed out")]
    Timeout(Address),

    /// The peer handler failed and reported why.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("codec failure: {0}")]
    Codec(String),
}

/// The client end of a bidirectional stream.
#[derive(Debug)]
pub struct ClientStream<Req, Res> {
    pub requests: mpsc::Sender<Req>,
    pub responses: mpsc::Receiver<Res>,
}

/// The server end of a bidirectional stream, handed to a registered
/// handler for each accepted stream.
pub struct ServerStream<Req, Res> {
    pub requests: mpsc::Receiver<Req>,
    pub responses: mpsc::Sender<Res>,
}

pub type StreamHandler<Req, Res> =
    Arc<dyn Fn(ServerStream<Req, Res>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub type UnaryHandler<Req, Res> =
    Arc<dyn Fn(Req) -> BoxFuture<'static, anyhow::Result<Res>> + Send + Sync>;

/// Opens bidirectional streams to peers and accepts them from peers.
#[async_trait]
pub trait StreamTransport<Req: Send + 'static, Res: Send + 'static>: Send + Sync {
    /// Opens a stream to `target`.
    async fn stream(&self, target: &Address) -> Result<ClientStream<Req, Res>, TransportError>;

    /// Registers the handler invoked for every stream accepted by this
    /// node. One handler per transport.
    fn handle(&self, handler: StreamHandler<Req, Res>);
}

/// Single request, single response.
#[async_trait]
pub trait UnaryTransport<Req: Send + 'static, Res: Send + 'static>: Send + Sync {
    async fn send(&self, target: &Address, req: Req) -> Result<Res, TransportError>;

    fn handle(&self, handler: UnaryHandler<Req, Res>);
}
