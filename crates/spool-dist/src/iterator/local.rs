//! Local iterator client.
//!
//! Executes each incoming request as a method call on the engine iterator,
//! then emits exactly one acknowledgement carrying the host node ID and the
//! command. Data the engine produced while executing is translated and
//! forwarded before the acknowledgement, so a consumer always sees a
//! command's data ahead of its ack.

use std::sync::Arc;

use async_trait::async_trait;
use spool_core::{Address, Keys, NodeId, TimeRange};
use spool_flow::{Flow, FlowError, Inlet, Node, Outlet, Sink, Source};
use spool_engine::{Engine, StreamIterator};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DistError;
use crate::frame::SegmentTranslator;
use crate::iterator::protocol::{Command, Request, Response};

pub struct LocalIterator {
    address: Address,
    host: NodeId,
    iter: Box<dyn StreamIterator>,
    data: mpsc::UnboundedReceiver<Vec<spool_engine::Segment>>,
    translator: SegmentTranslator,
    input: Option<Outlet<Request>>,
    out: Option<Inlet<Response>>,
}

impl LocalIterator {
    /// Opens the engine iterator for `keys` over `range` and wraps it as a
    /// pipeline client.
    pub async fn open(
        address: impl Into<Address>,
        engine: &Arc<dyn Engine>,
        host: NodeId,
        range: TimeRange,
        keys: &Keys,
    ) -> Result<LocalIterator, DistError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let iter = engine.open_iterator(range, keys.engine_keys(), tx).await?;
        Ok(LocalIterator {
            address: address.into(),
            host,
            iter,
            data: rx,
            translator: SegmentTranslator::new(keys),
            input: None,
            out: None,
        })
    }

    async fn execute(&mut self, request: Request) -> Response {
        let host = self.host;
        let command = request.command;
        match command {
            Command::Open => Response::nack(host, command, "iterator is already open"),
            Command::Next => Response::ack(host, command, self.iter.next().await),
            Command::Prev => Response::ack(host, command, self.iter.prev().await),
            Command::First => Response::ack(host, command, self.iter.first().await),
            Command::Last => Response::ack(host, command, self.iter.last().await),
            Command::NextSpan => Response::ack(host, command, self.iter.next_span(request.span).await),
            Command::PrevSpan => Response::ack(host, command, self.iter.prev_span(request.span).await),
            Command::NextRange => {
                Response::ack(host, command, self.iter.next_range(request.range).await)
            }
            Command::SeekFirst => Response::ack(host, command, self.iter.seek_first().await),
            Command::SeekLast => Response::ack(host, command, self.iter.seek_last().await),
            Command::SeekLT => Response::ack(host, command, self.iter.seek_lt(request.stamp).await),
            Command::SeekGE => Response::ack(host, command, self.iter.seek_ge(request.stamp).await),
            Command::Exhaust => {
                self.iter.exhaust().await;
                Response::ack(host, command, true)
            }
            Command::Valid => Response::ack(host, command, self.iter.valid()),
            Command::Error => match self.iter.error() {
                Some(err) => Response::nack(host, command, err.to_string()),
                None => Response::ack(host, command, true),
            },
            Command::Close => match self.iter.close().await {
                Ok(()) => Response::ack(host, command, true),
                Err(err) => Response::nack(host, command, err.to_string()),
            },
        }
    }

    /// Forwards every data batch the engine emitted for the command just
    /// executed. Batches are fully queued before the engine method returns,
    /// so draining here keeps data ahead of the acknowledgement.
    async fn forward_data(&mut self, out: &Inlet<Response>) -> Result<(), DistError> {
        while let Ok(batch) = self.data.try_recv() {
            let segments = self.translator.wrap(batch)?;
            out.send(Response::data(self.host, segments))
                .await
                .map_err(|_| DistError::Internal("response pipeline closed".into()))?;
        }
        Ok(())
    }
}

impl Node for LocalIterator {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl Sink<Request> for LocalIterator {
    fn in_from(&mut self, outlet: Outlet<Request>) {
        self.input = Some(outlet);
    }
}

impl Source<Response> for LocalIterator {
    fn out_to(&mut self, inlet: Inlet<Response>) {
        self.out = Some(inlet);
    }
}

#[async_trait]
impl Flow for LocalIterator {
    async fn flow(mut self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut input = self
            .input
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        let out = self
            .out
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = self.iter.close().await;
                    return Ok(());
                }
                request = input.recv() => match request {
                    None => {
                        debug!(node = %self.address, "request stream closed");
                        let _ = self.iter.close().await;
                        return Ok(());
                    }
                    Some(request) => {
                        let ack = self.execute(request).await;
                        self.forward_data(&out).await?;
                        if out.send(ack).await.is_err() {
                            return Err(FlowError::StreamClosed("iterator responses").into());
                        }
                    }
                },
            }
        }
    }
}
