//! Errors surfaced by the distribution layer.

use spool_cluster::{ClusterError, TransportError};
use spool_core::{KeyError, NodeId};
use spool_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistError {
    /// One or more channel keys are absent from the metadata store.
    #[error("channel keys not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    /// Another writer already holds one of the requested channels.
    #[error("writer locked: {0}")]
    Locked(String),

    /// A remote leaseholder could not be reached.
    #[error("leaseholder {0} unreachable: {1}")]
    Unreachable(NodeId, String),

    /// The synchronizer did not collect every acknowledgement in time.
    #[error("timed out waiting for leaseholder acknowledgements")]
    AckTimeout,

    /// The peer opened a stream with something other than an open request.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Bug-class conditions, always reported with detail.
    #[error("internal: {0}")]
    Internal(String),

    #[error(transparent)]
    Engine(EngineError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Flow(#[from] spool_flow::FlowError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<EngineError> for DistError {
    fn from(err: EngineError) -> DistError {
        match err {
            EngineError::Locked(key) => DistError::Locked(key.to_string()),
            other => DistError::Engine(other),
        }
    }
}
