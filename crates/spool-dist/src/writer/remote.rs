//! Remote writer client.
//!
//! Forwards requests onto the leaseholder's stream and merges its responses
//! into the writer's output stream. The open request carrying the target's
//! key subset is sent before the client joins the pipeline. Losing the peer
//! mid-stream pushes an error response to the caller and fails the
//! pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use spool_cluster::{ClientStream, StreamTransport};
use spool_core::{Address, Keys, NodeId};
use spool_flow::{Flow, FlowError, Inlet, Node, Outlet, Sink, Source};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::DistError;
use crate::writer::protocol::{Request, Response};

pub struct RemoteWriter {
    address: Address,
    node_id: NodeId,
    stream: Option<ClientStream<Request, Response>>,
    input: Option<Outlet<Request>>,
    out: Option<Inlet<Response>>,
}

impl RemoteWriter {
    pub async fn open(
        address: impl Into<Address>,
        transport: &Arc<dyn StreamTransport<Request, Response>>,
        target: &Address,
        node_id: NodeId,
        keys: Keys,
    ) -> Result<RemoteWriter, DistError> {
        let stream = transport.stream(target).await?;
        stream
            .requests
            .send(Request::open(keys))
            .await
            .map_err(|_| DistError::Unreachable(node_id, "failed to send open request".into()))?;
        debug!(%node_id, %target, "opened remote writer");
        Ok(RemoteWriter {
            address: address.into(),
            node_id,
            stream: Some(stream),
            input: None,
            out: None,
        })
    }
}

impl Node for RemoteWriter {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl Sink<Request> for RemoteWriter {
    fn in_from(&mut self, outlet: Outlet<Request>) {
        self.input = Some(outlet);
    }
}

impl Source<Response> for RemoteWriter {
    fn out_to(&mut self, inlet: Inlet<Response>) {
        self.out = Some(inlet);
    }
}

#[async_trait]
impl Flow for RemoteWriter {
    async fn flow(mut self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut input = self
            .input
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        let out = self
            .out
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        let ClientStream {
            requests,
            mut responses,
        } = self
            .stream
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;

        let mut requests = Some(requests);
        let mut input_open = true;
        let mut responses_open = true;
        loop {
            if !input_open && !responses_open {
                return Ok(());
            }
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                request = input.recv(), if input_open => match request {
                    None => {
                        // Input drained: close our send side so the server
                        // flushes and completes.
                        input_open = false;
                        requests = None;
                    }
                    Some(request) => {
                        let sent = match &requests {
                            Some(tx) => tx.send(request).await.is_ok(),
                            None => false,
                        };
                        if !sent {
                            warn!(node = %self.node_id, "leaseholder unreachable during write");
                            let _ = out
                                .send(Response::error(format!(
                                    "leaseholder {} unreachable",
                                    self.node_id
                                )))
                                .await;
                            return Err(FlowError::StreamClosed("writer transport").into());
                        }
                    }
                },
                response = responses.recv(), if responses_open => match response {
                    None => responses_open = false,
                    Some(response) => {
                        if out.send(response).await.is_err() {
                            return Ok(());
                        }
                    }
                },
            }
        }
    }
}
