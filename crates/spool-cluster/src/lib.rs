//! # Spool Cluster - Membership and Transports
//!
//! The gossip substrate that tracks cluster membership is an external
//! collaborator; this crate specifies its interface (host identity and
//! address resolution) and provides the transports the distribution layer
//! rides on: a unary request/response transport for channel creation and a
//! bidirectional stream transport for the iterator and writer pipelines.
//!
//! Two transport implementations ship here: an in-process mock network used
//! by every cross-node test, and a length-delimited TCP transport used by
//! the node binary.

pub mod membership;
pub mod mock;
pub mod tcp;
pub mod transport;

pub use membership::{resolve_address_map, AddressMap, ClusterError, HostResolver, StaticCluster};
pub use transport::{
    ClientStream, ServerStream, StreamHandler, StreamTransport, TransportError, UnaryHandler,
    UnaryTransport,
};
