//! # Spool Dist - The Distribution Layer
//!
//! Turns a set of node-local engines into one logical cluster. Clients on
//! any node address channels by key; this crate routes their reads and
//! writes to the leaseholders that own the underlying storage.
//!
//! ## Key Components
//!
//! - **Channel Service**: Creates and retrieves channel definitions,
//!   routing creation to each channel's leaseholder
//! - **Distributed Iterator**: An ordered, acknowledgement-synchronized
//!   traversal of segments across many leaseholders
//! - **Distributed Writer**: Multiplexes an incoming segment stream to the
//!   leaseholders that own each segment's channel
//! - **Server Handlers**: Wrap the local engine behind bidirectional
//!   streams for remote peers

pub mod channel;
pub mod error;
pub mod frame;
pub mod iterator;
pub mod writer;

pub use error::DistError;
pub use frame::Segment;
