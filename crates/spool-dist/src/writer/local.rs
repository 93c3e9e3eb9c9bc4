//! Local writer client.
//!
//! Bridges writer requests into the engine's writer session. The session
//! holds the per-channel locks from open until the input stream closes.
//! Write failures surface as error responses on the merged output stream;
//! the session keeps accepting subsequent batches.

use std::sync::Arc;

use async_trait::async_trait;
use spool_core::{Address, Keys};
use spool_engine::{Engine, StreamWriter};
use spool_flow::{Flow, FlowError, Inlet, Node, Outlet, Sink, Source};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::DistError;
use crate::writer::protocol::{Request, Response};

pub struct LocalWriter {
    address: Address,
    writer: Box<dyn StreamWriter>,
    input: Option<Outlet<Request>>,
    out: Option<Inlet<Response>>,
}

impl LocalWriter {
    /// Opens the engine writer session, taking the write locks for `keys`.
    pub async fn open(
        address: impl Into<Address>,
        engine: &Arc<dyn Engine>,
        keys: &Keys,
    ) -> Result<LocalWriter, DistError> {
        let writer = engine.open_writer(keys.engine_keys()).await?;
        Ok(LocalWriter {
            address: address.into(),
            writer,
            input: None,
            out: None,
        })
    }
}

impl Node for LocalWriter {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl Sink<Request> for LocalWriter {
    fn in_from(&mut self, outlet: Outlet<Request>) {
        self.input = Some(outlet);
    }
}

impl Source<Response> for LocalWriter {
    fn out_to(&mut self, inlet: Inlet<Response>) {
        self.out = Some(inlet);
    }
}

#[async_trait]
impl Flow for LocalWriter {
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
                    let _ = self.writer.close().await;
                    return Ok(());
                }
                request = input.recv() => match request {
                    None => {
                        debug!(node = %self.address, "writer input drained");
                        let _ = self.writer.close().await;
                        return Ok(());
                    }
                    Some(request) => {
                        let segments = request.segments.iter().map(|s| s.to_engine()).collect();
                        if let Err(err) = self.writer.write(segments).await {
                            warn!(node = %self.address, %err, "engine write failed");
                            if out.send(Response::error(err.to_string())).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                },
            }
        }
    }
}
