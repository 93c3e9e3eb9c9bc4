//! # Spool Flow - In-Process Dataflow Runtime
//!
//! This crate provides the small graph engine that the distributed iterator
//! and writer pipelines are built from. It defines the core streaming
//! primitives, node interfaces, and supervision structures used throughout
//! the spool workspace.
//!
//! ## Key Components
//!
//! - **Typed Streams**: Bounded FIFO channels between pipeline nodes, with
//!   closure as an explicit signal distinct from payloads
//! - **Node Traits**: Source, Sink, and Segment wiring interfaces plus the
//!   `Flow` execution trait for running a node as a task
//! - **Routers**: Declarative unary and multi routing with `unary` (merged
//!   queue) and `weave` (per-pair queue) stitching
//! - **Supervision**: A task group that starts every node, cancels the
//!   whole pipeline when any node fails, and reports the first error
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use spool_flow::{Broadcaster, Pipeline, TaskGroup};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut pipe = Pipeline::new();
//! let fanout: Broadcaster<u64> = Broadcaster::new("fanout");
//! // wire fanout with pipe.route_unary / pipe.route_multi, then:
//! pipe.set(Box::new(fanout))?;
//! let mut group = TaskGroup::new(CancellationToken::new());
//! pipe.start(&mut group);
//! group.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod fanout;
pub mod filter;
pub mod group;
pub mod node;
pub mod pipeline;
pub mod stream;
pub mod switch;

pub use bridge::{StreamReceiver, StreamSender};
pub use fanout::Broadcaster;
pub use filter::Filter;
pub use group::TaskGroup;
pub use node::{Flow, FlowError, Node, Segment, Sink, Source};
pub use pipeline::{Pipeline, Stitch};
pub use stream::{stream, Inlet, Outlet};
pub use switch::BatchSwitch;
