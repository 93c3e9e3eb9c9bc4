//! # Spool Core - Shared Vocabulary of the Distribution Layer
//!
//! This crate provides the foundational types shared by every other crate in
//! the spool workspace: telemetry primitives (timestamps, spans, ranges, data
//! rates), node identity, network addresses, the 6-byte channel key that
//! encodes a channel's leaseholder, and the batch factory that partitions
//! leased entities into local and per-remote-node buckets.
//!
//! ## Key Components
//!
//! - **Telemetry**: Nanosecond timestamps and the time arithmetic used by
//!   iterators and the engine
//! - **Channel Keys**: Fixed-width keys whose first four bytes name the
//!   leaseholder, making lease lookup a pure local function
//! - **Lease Batching**: Generic partitioning of leased entities by host
//!
//! ## Example Usage
//!
//! ```rust
//! use spool_core::{ChannelKey, EngineKey, NodeId};
//!
//! let key = ChannelKey::new(NodeId(1), EngineKey(2));
//! assert_eq!(key.to_string(), "1-2");
//! assert_eq!(key.node_id(), NodeId(1));
//! ```

pub mod address;
pub mod key;
pub mod node;
pub mod proxy;
pub mod telem;

pub use address::Address;
pub use key::{ChannelKey, EngineKey, KeyError, Keys};
pub use node::NodeId;
pub use proxy::{Batch, BatchFactory, Lease};
pub use telem::{DataRate, DataType, TimeRange, TimeSpan, TimeStamp};
