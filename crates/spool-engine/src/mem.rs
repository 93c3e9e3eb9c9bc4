//! In-memory engine.
//!
//! Segments live in per-channel vectors sorted by start timestamp. The
//! iterator takes a snapshot of the range at open, so concurrent writes
//! never move a live cursor. Writer sessions take per-channel locks at open
//! and release them on close or drop.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spool_core::{EngineKey, TimeRange, TimeSpan, TimeStamp};
use tracing::debug;

use crate::{Channel, Engine, EngineError, Segment, SegmentOutlet, StreamIterator, StreamWriter};

#[derive(Default)]
struct State {
    next_key: u16,
    channels: HashMap<EngineKey, Channel>,
    data: HashMap<EngineKey, Vec<Segment>>,
    locked: HashSet<EngineKey>,
}

/// A memory-backed [`Engine`].
#[derive(Clone, Default)]
pub struct MemEngine {
    state: Arc<Mutex<State>>,
}

impl MemEngine {
    pub fn new() -> MemEngine {
        MemEngine::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("engine state poisoned")
    }
}

#[async_trait]
impl Engine for MemEngine {
    async fn create_channel(&self, mut channel: Channel) -> Result<EngineKey, EngineError> {
        let mut state = self.lock();
        state.next_key += 1;
        let key = EngineKey(state.next_key);
        channel.key = key;
        state.channels.insert(key, channel);
        state.data.insert(key, Vec::new());
        debug!(%key, "created engine channel");
        Ok(key)
    }

    async fn channels(&self, keys: &[EngineKey]) -> Result<Vec<Channel>, EngineError> {
        let state = self.lock();
        keys.iter()
            .map(|k| {
                state
                    .channels
                    .get(k)
                    .copied()
                    .ok_or(EngineError::ChannelNotFound(*k))
            })
            .collect()
    }

    async fn open_iterator(
        &self,
        range: TimeRange,
        keys: Vec<EngineKey>,
        out: SegmentOutlet,
    ) -> Result<Box<dyn StreamIterator>, EngineError> {
        let state = self.lock();
        let mut channels = BTreeMap::new();
        for key in &keys {
            let channel = state
                .channels
                .get(key)
                .ok_or(EngineError::ChannelNotFound(*key))?;
            let segments = state
                .data
                .get(key)
                .map(|segs| {
                    segs.iter()
                        .filter_map(|seg| {
                            let end = seg.start + channel.span_of(seg.data.len());
                            // Keep any segment whose data intersects the range.
                            (end > range.start && seg.start < range.end)
                                .then(|| View {
                                    segment: seg.clone(),
                                    end,
                                })
                        })
                        .collect()
                })
                .unwrap_or_default();
            channels.insert(*key, segments);
        }
        let cursors = channels.keys().map(|k| (*k, -1i64)).collect();
        let mut iter = MemIterator {
            channels,
            cursors,
            range,
            pos: range.start,
            out,
            err: None,
        };
        iter.reset_to_start();
        Ok(Box::new(iter))
    }

    async fn open_writer(&self, keys: Vec<EngineKey>) -> Result<Box<dyn StreamWriter>, EngineError> {
        let mut state = self.lock();
        for key in &keys {
            if !state.channels.contains_key(key) {
                return Err(EngineError::ChannelNotFound(*key));
            }
            if state.locked.contains(key) {
                return Err(EngineError::Locked(*key));
            }
        }
        for key in &keys {
            state.locked.insert(*key);
        }
        debug!(?keys, "opened engine writer");
        Ok(Box::new(MemWriter {
            state: self.state.clone(),
            keys,
            closed: false,
        }))
    }

    async fn read_segments(&self, key: EngineKey) -> Result<Vec<Segment>, EngineError> {
        let state = self.lock();
        state
            .data
            .get(&key)
            .cloned()
            .ok_or(EngineError::ChannelNotFound(key))
    }
}

#[derive(Clone)]
struct View {
    segment: Segment,
    end: TimeStamp,
}

/// Cursor state: for each channel, the index of the last emitted segment,
/// with `-1` meaning "before the first" and `len` meaning "after the last".
struct MemIterator {
    channels: BTreeMap<EngineKey, Vec<View>>,
    cursors: BTreeMap<EngineKey, i64>,
    range: TimeRange,
    pos: TimeStamp,
    out: SegmentOutlet,
    err: Option<EngineError>,
}

impl MemIterator {
    fn emit(&mut self, segment: Segment) {
        if self.out.send(vec![segment]).is_err() && self.err.is_none() {
            self.err = Some(EngineError::Internal("segment outlet closed".into()));
        }
    }

    fn earliest_start(&self) -> Option<TimeStamp> {
        self.channels
            .values()
            .filter_map(|segs| segs.first().map(|v| v.segment.start))
            .min()
    }

    fn latest_end(&self) -> Option<TimeStamp> {
        self.channels
            .values()
            .filter_map(|segs| segs.last().map(|v| v.end))
            .max()
    }

    fn reset_to_start(&mut self) {
        for cursor in self.cursors.values_mut() {
            *cursor = -1;
        }
        self.pos = match self.earliest_start() {
            Some(start) => start.max(self.range.start),
            None => self.range.start,
        };
    }

    fn reset_to_end(&mut self) {
        for (key, cursor) in self.cursors.iter_mut() {
            *cursor = self.channels[key].len() as i64;
        }
        self.pos = match self.latest_end() {
            Some(end) => end.min(self.range.end),
            None => self.range.end,
        };
    }

    fn step_forward(&mut self) -> bool {
        let mut advanced = false;
        let mut frontier = self.pos;
        let mut emitted = Vec::new();
        for (key, segs) in &self.channels {
            let cursor = self.cursors.get_mut(key).expect("cursor for channel");
            let next = *cursor + 1;
            if (next as usize) < segs.len() {
                *cursor = next;
                let view = &segs[next as usize];
                emitted.push(view.segment.clone());
                frontier = frontier.max(view.end);
                advanced = true;
            }
        }
        for segment in emitted {
            self.emit(segment);
        }
        if advanced {
            self.pos = frontier;
        }
        advanced
    }

    fn step_back(&mut self) -> bool {
        let mut retreated = false;
        let mut frontier = self.pos;
        let mut emitted = Vec::new();
        for (key, segs) in &self.channels {
            let cursor = self.cursors.get_mut(key).expect("cursor for channel");
            let prev = *cursor - 1;
            if prev >= 0 && (prev as usize) < segs.len() {
                *cursor = prev;
                let view = &segs[prev as usize];
                emitted.push(view.segment.clone());
                frontier = frontier.min(view.segment.start);
                retreated = true;
            } else {
                *cursor = -1;
            }
        }
        for segment in emitted {
            self.emit(segment);
        }
        if retreated {
            self.pos = frontier;
        }
        retreated
    }
}

#[async_trait]
impl StreamIterator for MemIterator {
    async fn next(&mut self) -> bool {
        self.step_forward()
    }

    async fn prev(&mut self) -> bool {
        self.step_back()
    }

    async fn first(&mut self) -> bool {
        self.reset_to_start();
        self.step_forward()
    }

    async fn last(&mut self) -> bool {
        self.reset_to_end();
        self.step_back()
    }

    async fn next_span(&mut self, span: TimeSpan) -> bool {
        let window = TimeRange::new(self.pos, self.pos + span);
        let mut emitted = Vec::new();
        for (key, segs) in &self.channels {
            let cursor = self.cursors.get_mut(key).expect("cursor for channel");
            let mut index = *cursor + 1;
            while (index as usize) < segs.len() {
                let view = &segs[index as usize];
                if view.segment.start >= window.end {
                    break;
                }
                emitted.push(view.segment.clone());
                *cursor = index;
                index += 1;
            }
        }
        emitted.sort_by_key(|s| s.start);
        let any = !emitted.is_empty();
        for segment in emitted {
            self.emit(segment);
        }
        self.pos = window.end.min(self.range.end);
        any
    }

    async fn prev_span(&mut self, span: TimeSpan) -> bool {
        let window = TimeRange::new(self.pos - span, self.pos);
        let mut emitted = Vec::new();
        for (key, segs) in &self.channels {
            let cursor = self.cursors.get_mut(key).expect("cursor for channel");
            let mut index = *cursor - 1;
            while index >= 0 {
                let view = &segs[index as usize];
                if view.segment.start < window.start {
                    break;
                }
                if view.segment.start < window.end {
                    emitted.push(view.segment.clone());
                }
                *cursor = index;
                index -= 1;
            }
        }
        emitted.sort_by_key(|s| s.start);
        let any = !emitted.is_empty();
        for segment in emitted {
            self.emit(segment);
        }
        self.pos = window.start.max(self.range.start);
        any
    }

    async fn next_range(&mut self, range: TimeRange) -> bool {
        // Seek each cursor just before the first segment intersecting the
        // range, then emit everything that intersects it.
        let mut emitted = Vec::new();
        for (key, segs) in &self.channels {
            let cursor = self.cursors.get_mut(key).expect("cursor for channel");
            let first = segs.partition_point(|v| v.end <= range.start);
            *cursor = first as i64 - 1;
            let mut index = first;
            while index < segs.len() {
                let view = &segs[index];
                if view.segment.start >= range.end {
                    break;
                }
                emitted.push(view.segment.clone());
                *cursor = index as i64;
                index += 1;
            }
        }
        emitted.sort_by_key(|s| s.start);
        let any = !emitted.is_empty();
        for segment in emitted {
            self.emit(segment);
        }
        self.pos = range.end.min(self.range.end);
        any
    }

    async fn seek_first(&mut self) -> bool {
        self.reset_to_start();
        self.channels.values().any(|segs| !segs.is_empty())
    }

    async fn seek_last(&mut self) -> bool {
        self.reset_to_end();
        self.channels.values().any(|segs| !segs.is_empty())
    }

    async fn seek_lt(&mut self, stamp: TimeStamp) -> bool {
        let mut found = false;
        for (key, segs) in &self.channels {
            let cursor = self.cursors.get_mut(key).expect("cursor for channel");
            let before = segs.partition_point(|v| v.segment.start < stamp);
            if before > 0 {
                // Position just before the target so next() emits it.
                *cursor = before as i64 - 2;
                found = true;
            } else {
                *cursor = -1;
            }
        }
        if found {
            self.pos = stamp.max(self.range.start);
        }
        found
    }

    async fn seek_ge(&mut self, stamp: TimeStamp) -> bool {
        let mut found = false;
        for (key, segs) in &self.channels {
            let cursor = self.cursors.get_mut(key).expect("cursor for channel");
            let target = segs.partition_point(|v| v.segment.start < stamp);
            *cursor = target as i64 - 1;
            if target < segs.len() {
                found = true;
            }
        }
        if found {
            self.pos = stamp.max(self.range.start);
        }
        found
    }

    async fn exhaust(&mut self) {
        let mut emitted = Vec::new();
        for (key, segs) in &self.channels {
            let cursor = self.cursors.get_mut(key).expect("cursor for channel");
            let mut index = *cursor + 1;
            while (index as usize) < segs.len() {
                emitted.push(segs[index as usize].segment.clone());
                *cursor = index;
                index += 1;
            }
        }
        emitted.sort_by_key(|s| s.start);
        for segment in emitted {
            self.emit(segment);
        }
        self.pos = match self.latest_end() {
            Some(end) => end.min(self.range.end),
            None => self.range.end,
        };
    }

    fn valid(&self) -> bool {
        self.err.is_none()
            && self.channels.iter().any(|(key, segs)| {
                let cursor = self.cursors[key];
                cursor + 1 < segs.len() as i64
            })
    }

    fn error(&self) -> Option<EngineError> {
        self.err.clone()
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.channels.clear();
        self.cursors.clear();
        Ok(())
    }
}

struct MemWriter {
    state: Arc<Mutex<State>>,
    keys: Vec<EngineKey>,
    closed: bool,
}

impl MemWriter {
    fn unlock(&mut self) {
        if !self.closed {
            let mut state = self.state.lock().expect("engine state poisoned");
            for key in &self.keys {
                state.locked.remove(key);
            }
            self.closed = true;
        }
    }
}

#[async_trait]
impl StreamWriter for MemWriter {
    async fn write(&mut self, segments: Vec<Segment>) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("engine state poisoned");
        for segment in segments {
            if !self.keys.contains(&segment.channel_key) {
                return Err(EngineError::Internal(format!(
                    "channel {} is not part of this writer session",
                    segment.channel_key
                )));
            }
            let data = state
                .data
                .get_mut(&segment.channel_key)
                .ok_or(EngineError::ChannelNotFound(segment.channel_key))?;
            let at = data.partition_point(|s| s.start <= segment.start);
            data.insert(at, segment);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.unlock();
        Ok(())
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_core::telem::SECOND;
    use spool_core::{DataRate, DataType};
    use tokio::sync::mpsc;

    const SEGMENT_SPAN: TimeSpan = TimeSpan(10 * 1_000_000_000);

    async fn seeded_engine(segment_count: usize) -> (MemEngine, EngineKey) {
        let engine = MemEngine::new();
        let key = engine
            .create_channel(Channel::new(DataRate::hz(25.0), DataType::Float64))
            .await
            .unwrap();
        let mut writer = engine.open_writer(vec![key]).await.unwrap();
        for i in 0..segment_count {
            // 10 s of float64 samples at 25 Hz.
            let data = vec![0u8; 250 * 8];
            let start = TimeStamp(0) + SEGMENT_SPAN * i as i64;
            writer
                .write(vec![Segment::new(key, start, data)])
                .await
                .unwrap();
        }
        writer.close().await.unwrap();
        (engine, key)
    }

    async fn open(
        engine: &MemEngine,
        key: EngineKey,
        range: TimeRange,
    ) -> (
        Box<dyn StreamIterator>,
        mpsc::UnboundedReceiver<Vec<Segment>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let iter = engine.open_iterator(range, vec![key], tx).await.unwrap();
        (iter, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<Segment>>) -> Vec<Segment> {
        let mut all = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            all.extend(batch);
        }
        all
    }

    #[tokio::test]
    async fn create_assigns_sequential_keys() {
        let engine = MemEngine::new();
        let channel = Channel::new(DataRate::hz(1.0), DataType::Float64);
        let k1 = engine.create_channel(channel).await.unwrap();
        let k2 = engine.create_channel(channel).await.unwrap();
        let k3 = engine.create_channel(channel).await.unwrap();
        assert!(k1.0 < k2.0 && k2.0 < k3.0);
    }

    #[tokio::test]
    async fn first_and_next_walk_forward() {
        let (engine, key) = seeded_engine(10).await;
        let (mut iter, mut rx) = open(&engine, key, TimeRange::MAX).await;

        assert!(iter.first().await);
        let first = drain(&mut rx);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].start, TimeStamp(0));

        assert!(iter.next().await);
        let second = drain(&mut rx);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].start, TimeStamp(0) + SEGMENT_SPAN);
    }

    #[tokio::test]
    async fn last_and_prev_walk_backward() {
        let (engine, key) = seeded_engine(10).await;
        let (mut iter, mut rx) = open(&engine, key, TimeRange::MAX).await;

        assert!(iter.last().await);
        let last = drain(&mut rx);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].start, TimeStamp(0) + SEGMENT_SPAN * 9);

        assert!(iter.prev().await);
        let prev = drain(&mut rx);
        assert_eq!(prev[0].start, TimeStamp(0) + SEGMENT_SPAN * 8);
    }

    #[tokio::test]
    async fn seek_first_then_next_span_emits_window() {
        let (engine, key) = seeded_engine(10).await;
        let (mut iter, mut rx) = open(&engine, key, TimeRange::MAX).await;

        assert!(iter.seek_first().await);
        assert!(iter.next_span(SECOND * 20).await);
        let segments = drain(&mut rx);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, TimeStamp(0));
        assert_eq!(segments[1].start, TimeStamp(0) + SEGMENT_SPAN);

        // The window advanced: the next span starts where the last ended.
        assert!(iter.next_span(SECOND * 10).await);
        let more = drain(&mut rx);
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].start, TimeStamp(0) + SEGMENT_SPAN * 2);
    }

    #[tokio::test]
    async fn seek_last_then_prev_span_emits_window() {
        let (engine, key) = seeded_engine(10).await;
        let (mut iter, mut rx) = open(&engine, key, TimeRange::MAX).await;

        assert!(iter.seek_last().await);
        assert!(iter.prev_span(SECOND * 20).await);
        let segments = drain(&mut rx);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, TimeStamp(0) + SEGMENT_SPAN * 8);
        assert_eq!(segments[1].start, TimeStamp(0) + SEGMENT_SPAN * 9);
    }

    #[tokio::test]
    async fn next_range_emits_intersecting_segments() {
        let (engine, key) = seeded_engine(10).await;
        let (mut iter, mut rx) = open(&engine, key, TimeRange::MAX).await;

        let range = TimeRange::new(TimeStamp(0), TimeStamp(0) + SECOND * 30);
        assert!(iter.next_range(range).await);
        let segments = drain(&mut rx);
        assert_eq!(segments.len(), 3);
    }

    #[tokio::test]
    async fn exhaust_drains_to_range_end() {
        let (engine, key) = seeded_engine(100).await;
        let (mut iter, mut rx) = open(&engine, key, TimeRange::MAX).await;

        assert!(iter.first().await);
        iter.exhaust().await;
        let segments = drain(&mut rx);
        assert_eq!(segments.len(), 100);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.start, TimeStamp(0) + SEGMENT_SPAN * i as i64);
        }
        assert!(!iter.valid());
    }

    #[tokio::test]
    async fn seek_lt_and_ge_position_cursors() {
        let (engine, key) = seeded_engine(10).await;
        let (mut iter, mut rx) = open(&engine, key, TimeRange::MAX).await;

        let t = TimeStamp(0) + SECOND * 35;
        assert!(iter.seek_lt(t).await);
        assert!(iter.next().await);
        let seg = drain(&mut rx);
        assert_eq!(seg[0].start, TimeStamp(0) + SEGMENT_SPAN * 3);

        assert!(iter.seek_ge(t).await);
        assert!(iter.next().await);
        let seg = drain(&mut rx);
        assert_eq!(seg[0].start, TimeStamp(0) + SEGMENT_SPAN * 4);
    }

    #[tokio::test]
    async fn range_bounds_restrict_the_snapshot() {
        let (engine, key) = seeded_engine(10).await;
        let range = TimeRange::new(TimeStamp(0) + SECOND * 20, TimeStamp(0) + SECOND * 50);
        let (mut iter, mut rx) = open(&engine, key, range).await;

        assert!(iter.first().await);
        iter.exhaust().await;
        let segments = drain(&mut rx);
        // Segments starting at 20, 30, 40 s.
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].start, TimeStamp(0) + SEGMENT_SPAN * 2);
    }

    #[tokio::test]
    async fn writer_locks_are_exclusive_and_released_on_close() {
        let (engine, key) = seeded_engine(0).await;
        let mut w1 = engine.open_writer(vec![key]).await.unwrap();
        let err = engine.open_writer(vec![key]).await.unwrap_err();
        assert_eq!(err, EngineError::Locked(key));
        w1.close().await.unwrap();
        let w2 = engine.open_writer(vec![key]).await;
        assert!(w2.is_ok());
    }

    #[tokio::test]
    async fn writes_keep_segments_sorted() {
        let engine = MemEngine::new();
        let key = engine
            .create_channel(Channel::new(DataRate::hz(25.0), DataType::Float64))
            .await
            .unwrap();
        let mut writer = engine.open_writer(vec![key]).await.unwrap();
        for start in [30i64, 10, 20, 0] {
            let seg = Segment::new(key, TimeStamp(0) + SECOND * start, vec![0u8; 8]);
            writer.write(vec![seg]).await.unwrap();
        }
        writer.close().await.unwrap();
        let stored = engine.read_segments(key).await.unwrap();
        let starts: Vec<i64> = stored.iter().map(|s| s.start.0).collect();
        assert_eq!(
            starts,
            vec![0, 10_000_000_000, 20_000_000_000, 30_000_000_000]
        );
    }
}
