//! Address-keyed routing.
//!
//! A batch switch inspects each incoming value and routes derived values to
//! named outputs. The routing function is stateless with respect to the
//! switch itself, which is what lets the writer fan segments out to their
//! leaseholders without a coordinator: the destination is a pure function
//! of the segment key.

use std::collections::HashMap;

use async_trait::async_trait;
use spool_core::Address;
use tokio_util::sync::CancellationToken;

use crate::node::{Flow, FlowError, Node, Sink};
use crate::stream::{Inlet, Outlet};

/// Routes each input to zero or more addressed outputs. The route function
/// returns `(address, value)` pairs; each pair is sent to the output
/// registered under that address. Routing to an unregistered address is a
/// programming error and fails the node.
pub struct BatchSwitch<T, F> {
    address: Address,
    route: F,
    input: Option<Outlet<T>>,
    outputs: HashMap<Address, Inlet<T>>,
}

impl<T, F> BatchSwitch<T, F>
where
    F: FnMut(T) -> Vec<(Address, T)>,
{
    pub fn new(address: impl Into<Address>, route: F) -> BatchSwitch<T, F> {
        BatchSwitch {
            address: address.into(),
            route,
            input: None,
            outputs: HashMap::new(),
        }
    }

    /// Registers the output stream for an address.
    pub fn out_to_addr(&mut self, addr: impl Into<Address>, inlet: Inlet<T>) {
        self.outputs.insert(addr.into(), inlet);
    }
}

impl<T, F> Node for BatchSwitch<T, F> {
    fn address(&self) -> &Address {
        &self.address
    }
}

impl<T: Send, F: FnMut(T) -> Vec<(Address, T)>> Sink<T> for BatchSwitch<T, F> {
    fn in_from(&mut self, outlet: Outlet<T>) {
        self.input = Some(outlet);
    }
}

#[async_trait]
impl<T, F> Flow for BatchSwitch<T, F>
where
    T: Send + 'static,
    F: FnMut(T) -> Vec<(Address, T)> + Send + 'static,
{
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
                        for (addr, routed) in (self.route)(value) {
                            let out = self.outputs.get(&addr).ok_or_else(|| {
                                anyhow::anyhow!("switch {}: no output registered for {addr}", self.address)
                            })?;
                            if out.send(routed).await.is_err() {
                                return Err(FlowError::StreamClosed("switch output").into());
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
    async fn routes_to_registered_outputs() {
        let mut switch = BatchSwitch::new("parity", |v: u32| {
            let addr = if v % 2 == 0 { "even" } else { "odd" };
            vec![(Address::from(addr), v)]
        });
        let (tx, rx) = stream(4);
        switch.in_from(rx);
        let (even_tx, mut even_rx) = stream(4);
        let (odd_tx, mut odd_rx) = stream(4);
        switch.out_to_addr("even", even_tx);
        switch.out_to_addr("odd", odd_tx);

        let mut group = TaskGroup::new(CancellationToken::new());
        group.spawn_flow(Box::new(switch));

        for v in 0u32..4 {
            tx.send(v).await.unwrap();
        }
        drop(tx);

        assert_eq!(even_rx.recv().await, Some(0));
        assert_eq!(odd_rx.recv().await, Some(1));
        assert_eq!(even_rx.recv().await, Some(2));
        assert_eq!(odd_rx.recv().await, Some(3));
        group.wait().await.unwrap();
    }

    #[tokio::test]
    async fn unregistered_address_fails_the_node() {
        let mut switch =
            BatchSwitch::new("bad", |v: u32| vec![(Address::from("nowhere"), v)]);
        let (tx, rx) = stream(1);
        switch.in_from(rx);
        let mut group = TaskGroup::new(CancellationToken::new());
        group.spawn_flow(Box::new(switch));
        tx.send(1).await.unwrap();
        drop(tx);
        assert!(group.wait().await.is_err());
    }
}
