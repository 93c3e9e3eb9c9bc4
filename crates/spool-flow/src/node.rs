//! Node interfaces.
//!
//! Every pipeline element has an address used for routing; routers wire
//! streams into nodes through the `Source`/`Sink` traits, and the task group
//! runs each node through `Flow`. A node owns the inlets it was wired with,
//! so returning from `flow` drops them and closes the node's outgoing
//! streams, letting downstream nodes terminate cleanly.

use async_trait::async_trait;
use spool_core::Address;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::stream::{Inlet, Outlet};

/// Error types for pipeline construction and execution.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A stream closed underneath a node that still had values to move.
    #[error("stream closed: {0}")]
    StreamClosed(&'static str),

    /// Two nodes were registered under the same address. Addresses are the
    /// routing namespace of a pipeline, so this is a programming error.
    #[error("duplicate node address: {0}")]
    DuplicateAddress(Address),

    /// A node was started before routers connected its streams.
    #[error("node {0} is not wired")]
    NotWired(Address),

    /// Generic error wrapper for node-specific failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Base trait for all pipeline nodes.
pub trait Node {
    /// The unique address of this node within its pipeline.
    fn address(&self) -> &Address;
}

/// A node that produces values into one or more outgoing streams.
///
/// Single-output nodes treat a second `out_to` call as replacing the first;
/// fan-out nodes accumulate every inlet they are given.
pub trait Source<O: Send>: Node {
    fn out_to(&mut self, inlet: Inlet<O>);
}

/// A node that consumes values from an incoming stream.
pub trait Sink<I: Send>: Node {
    fn in_from(&mut self, outlet: Outlet<I>);
}

/// A node with both an input and an output stream.
pub trait Segment<I: Send, O: Send>: Sink<I> + Source<O> {}

impl<I: Send, O: Send, T: Sink<I> + Source<O>> Segment<I, O> for T {}

/// The execution half of a node: consumed by the task group and run as one
/// task. Nodes make progress only at stream operations and observe the
/// shutdown token at every suspension point.
#[async_trait]
pub trait Flow: Node + Send + 'static {
    async fn flow(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()>;
}
