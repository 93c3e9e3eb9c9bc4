//! The distributed iterator.
//!
//! Opening an iterator classifies the key set into a local bucket and one
//! bucket per remote leaseholder, opens a client for each, and wires them
//! into a pipeline:
//!
//! ```text
//! emitter -> broadcaster ->(weave) {remote*, local}
//! {remote*, local} ->(unary) filter -> {external out, synchronizer}
//! ```
//!
//! Every traversal method emits a request and then waits on the
//! synchronizer for one acknowledgement per participating leaseholder,
//! returning the boolean AND of the acknowledgements. Data responses flow
//! to the external output stream and never reach the synchronizer.

mod emitter;
mod local;
mod protocol;
mod remote;
mod server;
mod sync;

pub use protocol::{Command, Request, Response, ResponseVariant};
pub use server::serve_iterator;
pub use sync::DEFAULT_ACK_TIMEOUT;

use std::sync::Arc;
use std::time::Duration;

use spool_cluster::{HostResolver, StreamTransport};
use spool_core::{BatchFactory, Keys, TimeRange, TimeSpan, TimeStamp};
use spool_engine::Engine;
use spool_flow::{stream, Broadcaster, Filter, Outlet, Pipeline, Sink, Source, Stitch, TaskGroup};
use tokio_util::sync::CancellationToken;

use crate::channel::Service;
use crate::error::DistError;
use emitter::Emitter;
use local::LocalIterator;
use remote::RemoteIterator;
use sync::Synchronizer;

/// The transport iterator streams ride on.
pub type IteratorTransport = dyn StreamTransport<Request, Response>;

#[derive(Debug, Clone)]
pub struct IteratorConfig {
    /// How long the synchronizer waits for a command's acknowledgements.
    pub ack_timeout: Duration,
    /// Buffer capacity of the external output stream. A command whose data
    /// outgrows this buffer backpressures the pipeline until the caller
    /// drains; callers issuing large traversals should consume from
    /// another task.
    pub response_buffer: usize,
}

impl Default for IteratorConfig {
    fn default() -> Self {
        IteratorConfig {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            response_buffer: 10,
        }
    }
}

/// Validates that every key exists in the metadata store.
pub(crate) async fn validate_channel_keys(
    service: &Service,
    keys: &Keys,
) -> Result<(), DistError> {
    if keys.is_empty() {
        return Err(DistError::NotFound("empty key set".into()));
    }
    let exists = service
        .new_retrieve()
        .where_keys(keys.clone())
        .exists()
        .await?;
    if !exists {
        return Err(DistError::NotFound(keys.strings().join(", ")));
    }
    Ok(())
}

/// A client-facing read handle over segments spread across leaseholders.
pub struct SegmentIterator {
    emitter: Emitter,
    synchronizer: Synchronizer,
    group: TaskGroup,
    responses: Outlet<Response>,
}

impl std::fmt::Debug for SegmentIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentIterator").finish_non_exhaustive()
    }
}

impl SegmentIterator {
    /// Opens an iterator over `keys` within `range`.
    pub async fn open(
        engine: Arc<dyn Engine>,
        service: &Service,
        resolver: Arc<dyn HostResolver>,
        transport: Arc<IteratorTransport>,
        range: TimeRange,
        keys: Keys,
        config: IteratorConfig,
    ) -> Result<SegmentIterator, DistError> {
        validate_channel_keys(service, &keys).await?;

        let host = resolver.host_id();
        let node_ids = keys.unique_node_ids();
        let batch = BatchFactory::new(host).batch(keys.iter().copied());

        let mut pipe = Pipeline::new();
        let mut emitter = Emitter::new("emitter");
        let mut synchronizer =
            Synchronizer::new("synchronizer", node_ids.clone(), config.ack_timeout);

        let mut local = match batch.has_local() {
            true => Some(
                LocalIterator::open(
                    "local",
                    &engine,
                    host,
                    range,
                    &Keys::new(batch.local.clone()),
                )
                .await?,
            ),
            false => None,
        };
        let mut remotes = Vec::with_capacity(batch.remote.len());
        for (node_id, node_keys) in &batch.remote {
            let target = resolver.resolve(*node_id)?;
            remotes.push(
                RemoteIterator::open(
                    format!("remote-{node_id}"),
                    &transport,
                    &target,
                    *node_id,
                    Keys::new(node_keys.clone()),
                    range,
                )
                .await?,
            );
        }

        // Request side. With both a local and remote clients present, a
        // broadcaster fans requests out over per-link queues; with a single
        // side the emitter feeds it directly.
        let mut broadcaster = (local.is_some() && !remotes.is_empty())
            .then(|| Broadcaster::<Request>::new("broadcaster"));
        {
            let mut request_sinks: Vec<&mut dyn Sink<Request>> = Vec::new();
            for client in remotes.iter_mut() {
                request_sinks.push(client);
            }
            if let Some(local) = local.as_mut() {
                request_sinks.push(local);
            }
            match broadcaster.as_mut() {
                Some(broadcaster) => {
                    pipe.route_unary(&mut emitter, broadcaster, 1);
                    let mut sources: [&mut dyn Source<Request>; 1] = [broadcaster];
                    pipe.route_multi(&mut sources, &mut request_sinks, Stitch::Weave, 1);
                }
                None => {
                    let mut sources: [&mut dyn Source<Request>; 1] = [&mut emitter];
                    pipe.route_multi(&mut sources, &mut request_sinks, Stitch::Weave, 1);
                }
            }
        }

        // Response side: one merged queue into the filter, sized at the
        // participant count so acknowledgements never block data.
        let mut filter = Filter::new("filter", |r: &Response| r.variant == ResponseVariant::Data);
        {
            let mut response_sources: Vec<&mut dyn Source<Response>> = Vec::new();
            for client in remotes.iter_mut() {
                response_sources.push(client);
            }
            if let Some(local) = local.as_mut() {
                response_sources.push(local);
            }
            let mut sinks: [&mut dyn Sink<Response>; 1] = [&mut filter];
            pipe.route_multi(&mut response_sources, &mut sinks, Stitch::Unary, node_ids.len());
        }
        let (external_tx, external_rx) = stream(config.response_buffer);
        filter.out_to(external_tx);
        let (ack_tx, ack_rx) = stream(node_ids.len());
        filter.reject_to(ack_tx);
        synchronizer.in_from(ack_rx);

        if let Some(broadcaster) = broadcaster {
            pipe.set(Box::new(broadcaster))?;
        }
        for client in remotes {
            pipe.set(Box::new(client))?;
        }
        if let Some(local) = local {
            pipe.set(Box::new(local))?;
        }
        pipe.set(Box::new(filter))?;

        let mut group = TaskGroup::new(CancellationToken::new());
        pipe.start(&mut group);

        Ok(SegmentIterator {
            emitter,
            synchronizer,
            group,
            responses: external_rx,
        })
    }

    /// The external output stream of data responses.
    pub fn responses(&mut self) -> &mut Outlet<Response> {
        &mut self.responses
    }

    /// Moves the output stream out of the handle, for callers that drain it
    /// from another task while traversal methods run.
    pub fn take_responses(&mut self) -> Outlet<Response> {
        let (tx, rx) = stream(1);
        drop(tx);
        std::mem::replace(&mut self.responses, rx)
    }

    pub async fn next(&mut self) -> bool {
        if self.emitter.next().await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::Next).await
    }

    pub async fn prev(&mut self) -> bool {
        if self.emitter.prev().await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::Prev).await
    }

    pub async fn first(&mut self) -> bool {
        if self.emitter.first().await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::First).await
    }

    pub async fn last(&mut self) -> bool {
        if self.emitter.last().await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::Last).await
    }

    pub async fn next_span(&mut self, span: TimeSpan) -> bool {
        if self.emitter.next_span(span).await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::NextSpan).await
    }

    pub async fn prev_span(&mut self, span: TimeSpan) -> bool {
        if self.emitter.prev_span(span).await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::PrevSpan).await
    }

    pub async fn next_range(&mut self, range: TimeRange) -> bool {
        if self.emitter.next_range(range).await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::NextRange).await
    }

    pub async fn seek_first(&mut self) -> bool {
        if self.emitter.seek_first().await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::SeekFirst).await
    }

    pub async fn seek_last(&mut self) -> bool {
        if self.emitter.seek_last().await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::SeekLast).await
    }

    pub async fn seek_lt(&mut self, stamp: TimeStamp) -> bool {
        if self.emitter.seek_lt(stamp).await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::SeekLT).await
    }

    pub async fn seek_ge(&mut self, stamp: TimeStamp) -> bool {
        if self.emitter.seek_ge(stamp).await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::SeekGE).await
    }

    /// Drains every participating cursor to the end of the range.
    pub async fn exhaust(&mut self) -> bool {
        if self.emitter.exhaust().await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::Exhaust).await
    }

    /// Whether every leaseholder cursor is still valid.
    pub async fn valid(&mut self) -> bool {
        if self.emitter.valid().await.is_err() {
            return false;
        }
        self.synchronizer.sync(Command::Valid).await
    }

    /// Surfaces the first error any leaseholder has accumulated.
    pub async fn error(&mut self) -> Option<DistError> {
        if let Err(err) = self.emitter.error().await {
            return Some(err);
        }
        let (responses, ok) = self.synchronizer.sync_with_responses(Command::Error).await;
        if ok {
            return None;
        }
        match responses.into_iter().find(|r| !r.ack) {
            Some(response) => {
                let detail = response.error.unwrap_or_else(|| "unknown error".into());
                Some(DistError::Internal(format!(
                    "node {}: {detail}",
                    response.node_id
                )))
            }
            None => Some(DistError::AckTimeout),
        }
    }

    /// Emits a close request, awaits one acknowledgement per leaseholder,
    /// then tears the pipeline down and waits for every node to exit. A
    /// negative close acknowledgement marks an unreachable leaseholder and
    /// is surfaced as an error.
    pub async fn close(mut self) -> Result<(), DistError> {
        let close_result = match self.emitter.close().await {
            Err(err) => Err(err),
            Ok(()) => {
                let (responses, ok) =
                    self.synchronizer.sync_with_responses(Command::Close).await;
                if ok {
                    Ok(())
                } else if let Some(nack) = responses.into_iter().find(|r| !r.ack) {
                    Err(DistError::Unreachable(
                        nack.node_id,
                        nack.error
                            .unwrap_or_else(|| "negative close acknowledgement".into()),
                    ))
                } else {
                    Err(DistError::AckTimeout)
                }
            }
        };
        // Close the request streams, cancel the group, and wait for every
        // node to exit before reporting.
        drop(self.emitter);
        self.group.cancel();
        let wait_result = self.group.wait().await;
        close_result?;
        wait_result.map_err(DistError::Other)
    }
}
