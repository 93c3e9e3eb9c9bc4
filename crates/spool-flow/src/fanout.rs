//! Fan-out.
//!
//! The broadcaster duplicates each incoming value to every outgoing stream.
//! Paired with `Stitch::Weave` routing it gives every destination a
//! dedicated queue, so a slow consumer exerts backpressure on the
//! broadcaster without starving its siblings of anything already queued.

use async_trait::async_trait;
use spool_core::Address;
use tokio_util::sync::CancellationToken;

use crate::node::{Flow, FlowError, Node, Sink, Source};
use crate::stream::{Inlet, Outlet};

pub struct Broadcaster<T> {
    address: Address,
    input: Option<Outlet<T>>,
    outputs: Vec<Inlet<T>>,
}

impl<T> Broadcaster<T> {
    pub fn new(address: impl Into<Address>) -> Broadcaster<T> {
        Broadcaster {
            address: address.into(),
            input: None,
            outputs: Vec::new(),
        }
    }
}

impl<T> Node for Broadcaster<T> {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl<T: Send> Sink<T> for Broadcaster<T> {
    fn in_from(&mut self, outlet: Outlet<T>) {
        self.input = Some(outlet);
    }
}

impl<T: Send> Source<T> for Broadcaster<T> {
    fn out_to(&mut self, inlet: Inlet<T>) {
        self.outputs.push(inlet);
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Flow for Broadcaster<T> {
    async fn flow(mut self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut input = self
            .input
            .take()
            .ok_or_else(|| FlowError::NotWired(self.address.clone()))?;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                value = input.recv() => match value {
                    None => return Ok(()),
                    Some(value) => {
                        for out in &self.outputs {
                            if out.send(value.clone()).await.is_err() {
                                return Err(FlowError::StreamClosed("broadcaster output").into());
                            }
                        }
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::TaskGroup;
    use crate::stream::stream;

    #[tokio::test]
    async fn duplicates_every_value_to_every_output() {
        let mut fanout = Broadcaster::new("fanout");
        let (tx, rx) = stream(2);
        fanout.in_from(rx);
        let (out_a, mut rx_a) = stream(2);
        let (out_b, mut rx_b) = stream(2);
        fanout.out_to(out_a);
        fanout.out_to(out_b);

        let mut group = TaskGroup::new(CancellationToken::new());
        group.spawn_flow(Box::new(fanout));

        tx.send(7u32).await.unwrap();
        tx.send(8u32).await.unwrap();
        drop(tx);

        assert_eq!(rx_a.recv().await, Some(7));
        assert_eq!(rx_a.recv().await, Some(8));
        assert_eq!(rx_b.recv().await, Some(7));
        assert_eq!(rx_b.recv().await, Some(8));
        // Input closure tears the broadcaster down and closes its outputs.
        assert_eq!(rx_a.recv().await, None);
        assert_eq!(rx_b.recv().await, None);
        group.wait().await.unwrap();
    }
}
