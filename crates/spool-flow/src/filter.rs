//! Predicate routing.
//!
//! A filter splits one input stream across two output streams: values the
//! predicate accepts continue forward, values it rejects are diverted. The
//! iterator response pipeline uses this to peel acknowledgements away from
//! data before data reaches the caller.

use async_trait::async_trait;
use spool_core::Address;
use tokio_util::sync::CancellationToken;

use crate::node::{Flow, FlowError, Node, Sink, Source};
use crate::stream::{Inlet, Outlet};

pub struct Filter<T, F> {
    address: Address,
    predicate: F,
    input: Option<Outlet<T>>,
    accepted: Option<Inlet<T>>,
    rejected: Option<Inlet<T>>,
}

impl<T, F: FnMut(&T) -> bool> Filter<T, F> {
    pub fn new(address: impl Into<Address>, predicate: F) -> Filter<T, F> {
        Filter {
            address: address.into(),
            predicate,
            input: None,
            accepted: None,
            rejected: None,
        }
    }

    /// Wires the stream that rejected values are diverted to.
    pub fn reject_to(&mut self, inlet: Inlet<T>) {
        self.rejected = Some(inlet);
    }
}

impl<T, F> Node for Filter<T, F> {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl<T: Send, F: FnMut(&T) -> bool> Sink<T> for Filter<T, F> {
    fn in_from(&mut self, outlet: Outlet<T>) {
        self.input = Some(outlet);
    }
}

impl<T: Send, F: FnMut(&T) -> bool> Source<T> for Filter<T, F> {
    fn out_to(&mut self, inlet: Inlet<T>) {
        self.accepted = Some(inlet);
    }
}

#[async_trait]
impl<T, F> Flow for Filter<T, F>
where
    T: Send + 'static,
    F: FnMut(&T) -> bool + Send + 'static,
{
    async fn flow(mut self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut input = self
            .input
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        let accepted = self
            .accepted
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        let rejected = self.rejected.take();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                value = input.recv() => match value {
                    None => return Ok(()),
                    Some(value) => {
                        let target = if (self.predicate)(&value) {
                            &accepted
                        } else {
                            match &rejected {
                                Some(r) => r,
                                // No reject stream wired: drop the value.
                                None => continue,
                            }
                        };
                        if target.send(value).await.is_err() {
                            return Err(FlowError::StreamClosed("filter output").into());
                        }
                    }
                },
            }
        }
    }
}
