//! Remote iterator client.
//!
//! Forwards requests onto the leaseholder's stream and surfaces incoming
//! responses on its output. The open request carrying the target's key
//! subset and the time range is sent before the client joins the pipeline.
//! When the peer becomes unreachable, every subsequent request is answered
//! with a synthesized negative acknowledgement so the synchronizer fails
//! fast instead of timing out.

use std::sync::Arc;

use async_trait::async_trait;
use spool_cluster::{ClientStream, StreamTransport};
use spool_core::{Address, Keys, NodeId, TimeRange};
use spool_flow::{Flow, FlowError, Inlet, Node, Outlet, Sink, Source};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::DistError;
use crate::iterator::protocol::{Command, Request, Response};

pub struct RemoteIterator {
    address: Address,
    node_id: NodeId,
    stream: Option<ClientStream<Request, Response>>,
    input: Option<Outlet<Request>>,
    out: Option<Inlet<Response>>,
}

impl RemoteIterator {
    /// Opens a stream to the leaseholder and sends the open request for its
    /// key subset.
    pub async fn open(
        address: impl Into<Address>,
        transport: &Arc<dyn StreamTransport<Request, Response>>,
        target: &Address,
        node_id: NodeId,
        keys: Keys,
        range: TimeRange,
    ) -> Result<RemoteIterator, DistError> {
        let stream = transport.stream(target).await?;
        stream
            .requests
            .send(Request {
                range,
                keys,
                ..Request::new(Command::Open)
            })
            .await
            .map_err(|_| DistError::Unreachable(node_id, "failed to send open request".into()))?;
        debug!(%node_id, %target, "opened remote iterator");
        Ok(RemoteIterator {
            address: address.into(),
            node_id,
            stream: Some(stream),
            input: None,
            out: None,
        })
    }
}

impl Node for RemoteIterator {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl Sink<Request> for RemoteIterator {
    fn in_from(&mut self, outlet: Outlet<Request>) {
        self.input = Some(outlet);
    }
}

impl Source<Response> for RemoteIterator {
    fn out_to(&mut self, inlet: Inlet<Response>) {
        self.out = Some(inlet);
    }
}

#[async_trait]
impl Flow for RemoteIterator {
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

        // Dropping the request half closes our send side, which is how
        // close propagates to the server.
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
                        input_open = false;
                        requests = None;
                    }
                    Some(request) => {
                        let command = request.command;
                        let sent = match &requests {
                            Some(tx) => tx.send(request).await.is_ok(),
                            None => false,
                        };
                        if !sent {
                            requests = None;
                            warn!(node = %self.node_id, ?command, "leaseholder unreachable");
                            let nack = Response::nack(
                                self.node_id,
                                command,
                                format!("leaseholder {} unreachable", self.node_id),
                            );
                            if out.send(nack).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                },
                response = responses.recv(), if responses_open => match response {
                    None => {
                        responses_open = false;
                        if input_open {
                            debug!(node = %self.node_id, "response stream closed by peer");
                        }
                    }
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
