//! Transport bridges.
//!
//! A bidirectional transport stream surfaces as a pair of mpsc halves. The
//! bridge nodes adapt those halves into pipeline streams: `StreamReceiver`
//! pulls messages off the transport and pushes them into the pipeline,
//! `StreamSender` drains a pipeline stream onto the transport. Dropping the
//! sender's transport half on exit closes the peer's receive side, which is
//! how stream closure propagates across the network.

use async_trait::async_trait;
use spool_core::Address;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::node::{Flow, FlowError, Node, Sink, Source};
use crate::stream::{Inlet, Outlet};

/// Bridges an incoming transport stream into the pipeline.
pub struct StreamReceiver<M> {
    address: Address,
    transport: Option<mpsc::Receiver<M>>,
    out: Option<Inlet<M>>,
}

impl<M> StreamReceiver<M> {
    pub fn new(address: impl Into<Address>, transport: mpsc::Receiver<M>) -> StreamReceiver<M> {
        StreamReceiver {
            address: address.into(),
            transport: Some(transport),
            out: None,
        }
    }
}

impl<M> Node for StreamReceiver<M> {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl<M: Send> Source<M> for StreamReceiver<M> {
    fn out_to(&mut self, inlet: Inlet<M>) {
        self.out = Some(inlet);
    }
}

#[async_trait]
impl<M: Send + 'static> Flow for StreamReceiver<M> {
    async fn flow(mut self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut transport = self
            .transport
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        let out = self
            .out
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                msg = transport.recv() => match msg {
                    // Peer closed its send side: normal shutdown.
                    None => return Ok(()),
                    Some(msg) => {
                        if out.send(msg).await.is_err() {
                            return Ok(());
                        }
                    }
                },
            }
        }
    }
}

/// Bridges a pipeline stream onto an outgoing transport stream.
pub struct StreamSender<M> {
    address: Address,
    input: Option<Outlet<M>>,
    transport: Option<mpsc::Sender<M>>,
}

impl<M> StreamSender<M> {
    pub fn new(address: impl Into<Address>, transport: mpsc::Sender<M>) -> StreamSender<M> {
        StreamSender {
            address: address.into(),
            input: None,
            transport: Some(transport),
        }
    }
}

impl<M> Node for StreamSender<M> {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl<M: Send> Sink<M> for StreamSender<M> {
    fn in_from(&mut self, outlet: Outlet<M>) {
        self.input = Some(outlet);
    }
}

#[async_trait]
impl<M: Send + 'static> Flow for StreamSender<M> {
    async fn flow(mut self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut input = self
            .input
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        let transport = self
            .transport
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                msg = input.recv() => match msg {
                    None => return Ok(()),
                    Some(msg) => {
                        if transport.send(msg).await.is_err() {
                            // Peer is gone; nothing more to drain.
                            return Ok(());
                        }
                    }
                },
            }
        }
    }
}
