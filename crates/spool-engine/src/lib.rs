//! # Spool Engine - Node-Local Storage Interface
//!
//! The distribution layer treats segment storage as an external
//! collaborator. This crate pins down that collaborator's interface: channel
//! creation, a streaming iterator over a time range, and a locking writer
//! session. It also ships an in-memory engine implementing the interface,
//! which backs every integration test and the `--mem` node bootstrap.
//!
//! Everything here is engine-local: keys are [`EngineKey`]s, unique only
//! within one node. The distribution layer wraps engine segments with
//! cluster-wide channel keys before they leave the node.

pub mod mem;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use spool_core::{DataRate, DataType, EngineKey, TimeRange, TimeSpan, TimeStamp};
use thiserror::Error;
use tokio::sync::mpsc;

pub use mem::MemEngine;

/// Errors surfaced by an engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("channel {0} not found in engine")]
    ChannelNotFound(EngineKey),

    /// Another writer session currently holds the channel.
    #[error("channel {0} is locked by another writer")]
    Locked(EngineKey),

    #[error("engine internal error: {0}")]
    Internal(String),
}

/// An engine-local channel descriptor. The key is zero until the engine
/// assigns one at creation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "engineKey")]
    pub key: EngineKey,
    #[serde(rename = "dataRate")]
    pub data_rate: DataRate,
    #[serde(rename = "dataType")]
    pub data_type: DataType,
}

impl Channel {
    pub fn new(data_rate: DataRate, data_type: DataType) -> Channel {
        Channel {
            key: EngineKey(0),
            data_rate,
            data_type,
        }
    }

    /// The time a payload of `len` bytes spans at this channel's rate.
    pub fn span_of(&self, len: usize) -> TimeSpan {
        let samples = len / self.data_type.density();
        TimeSpan((self.data_rate.period().0).saturating_mul(samples as i64))
    }
}

/// One contiguous chunk of a channel's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "channelKey")]
    pub channel_key: EngineKey,
    pub start: TimeStamp,
    pub data: Bytes,
}

impl Segment {
    pub fn new(channel_key: EngineKey, start: TimeStamp, data: impl Into<Bytes>) -> Segment {
        Segment {
            channel_key,
            start,
            data: data.into(),
        }
    }
}

/// The outlet a [`StreamIterator`] delivers data batches into.
///
/// Delivery is part of the iterator contract: every batch a traversal
/// method produces is fully handed to the outlet before the method
/// returns, so a caller that drains the outlet after a method call
/// observes all of that call's data before anything else it does.
pub type SegmentOutlet = mpsc::UnboundedSender<Vec<Segment>>;

/// A cursor over the segments of a set of channels within a time range.
///
/// Traversal methods return whether the iterator remains valid; data they
/// produce is delivered through the outlet supplied at open (see
/// [`SegmentOutlet`]).
#[async_trait]
pub trait StreamIterator: Send {
    /// Advances each channel cursor by one segment and emits it.
    async fn next(&mut self) -> bool;

    /// Retreats each channel cursor by one segment and emits it.
    async fn prev(&mut self) -> bool;

    /// Repositions to the start of the range and emits the first segment of
    /// each channel.
    async fn first(&mut self) -> bool;

    /// Repositions to the end of the range and emits the last segment of
    /// each channel.
    async fn last(&mut self) -> bool;

    /// Emits every segment starting within the next `span` of time.
    async fn next_span(&mut self, span: TimeSpan) -> bool;

    /// Emits every segment starting within the previous `span` of time.
    async fn prev_span(&mut self, span: TimeSpan) -> bool;

    /// Seeks to `range.start` and emits every segment whose data intersects
    /// the range. Segments are not trimmed to the exact boundaries; a
    /// segment that merely overlaps the range is emitted whole.
    async fn next_range(&mut self, range: TimeRange) -> bool;

    /// Positions just before the first segment. Emits nothing.
    async fn seek_first(&mut self) -> bool;

    /// Positions just after the last segment. Emits nothing.
    async fn seek_last(&mut self) -> bool;

    /// Positions so the next call to [`next`](Self::next) emits the latest
    /// segment starting strictly before `stamp`. Emits nothing.
    async fn seek_lt(&mut self, stamp: TimeStamp) -> bool;

    /// Positions so the next call to [`next`](Self::next) emits the
    /// earliest segment starting at or after `stamp`. Emits nothing.
    async fn seek_ge(&mut self, stamp: TimeStamp) -> bool;

    /// Drains every remaining segment to the end of the range.
    async fn exhaust(&mut self);

    /// Whether any channel cursor can still advance.
    fn valid(&self) -> bool;

    /// The first error the iterator accumulated, if any.
    fn error(&self) -> Option<EngineError>;

    async fn close(&mut self) -> Result<(), EngineError>;
}

/// A writer session over a set of channels. Opening the session locks every
/// channel in it; the lock is released on close (or drop).
#[async_trait]
pub trait StreamWriter: Send {
    /// Persists a batch of segments. Every segment must belong to one of
    /// the channels the session was opened with.
    async fn write(&mut self, segments: Vec<Segment>) -> Result<(), EngineError>;

    async fn close(&mut self) -> Result<(), EngineError>;
}

impl std::fmt::Debug for dyn StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter").finish_non_exhaustive()
    }
}

/// The node-local storage engine, at the interface the distribution layer
/// consumes.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Creates a channel, assigning it the next engine-local key.
    async fn create_channel(&self, channel: Channel) -> Result<EngineKey, EngineError>;

    /// Looks up channel descriptors. Fails if any key is unknown.
    async fn channels(&self, keys: &[EngineKey]) -> Result<Vec<Channel>, EngineError>;

    /// Opens a streaming iterator over `keys` within `range`, delivering
    /// data batches into `out`.
    async fn open_iterator(
        &self,
        range: TimeRange,
        keys: Vec<EngineKey>,
        out: SegmentOutlet,
    ) -> Result<Box<dyn StreamIterator>, EngineError>;

    /// Opens a writer session over `keys`, taking the per-channel write
    /// locks. Fails with [`EngineError::Locked`] if any channel is held by
    /// another session.
    async fn open_writer(&self, keys: Vec<EngineKey>) -> Result<Box<dyn StreamWriter>, EngineError>;

    /// Reads back every segment stored for a channel, in start order.
    /// Verification hook for tests and tooling.
    async fn read_segments(&self, key: EngineKey) -> Result<Vec<Segment>, EngineError>;
}
