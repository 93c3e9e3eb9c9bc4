//! In-process network.
//!
//! Every test cluster runs on one of these: each node binds a transport at
//! its address, streams are plain channel pairs, and handlers run as tasks
//! on the caller's runtime. `kill` makes a node unreachable and aborts its
//! live server tasks, which is how the unreachable-leaseholder scenarios
//! are staged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spool_core::Address;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::transport::{
    ClientStream, ServerStream, StreamHandler, StreamTransport, TransportError, UnaryHandler,
    UnaryTransport,
};

struct StreamNetState<Req, Res> {
    handlers: HashMap<Address, StreamHandler<Req, Res>>,
    tokens: HashMap<Address, CancellationToken>,
    dead: Vec<Address>,
}

impl<Req, Res> Default for StreamNetState<Req, Res> {
    fn default() -> Self {
        StreamNetState {
            handlers: HashMap::new(),
            tokens: HashMap::new(),
            dead: Vec::new(),
        }
    }
}

/// An in-process bidirectional-stream network.
pub struct Network<Req, Res> {
    state: Arc<Mutex<StreamNetState<Req, Res>>>,
}

impl<Req, Res> Clone for Network<Req, Res> {
    fn clone(&self) -> Self {
        Network {
            state: self.state.clone(),
        }
    }
}

impl<Req, Res> Default for Network<Req, Res> {
    fn default() -> Self {
        Network {
            state: Arc::new(Mutex::new(StreamNetState::default())),
        }
    }
}

impl<Req: Send + 'static, Res: Send + 'static> Network<Req, Res> {
    pub fn new() -> Network<Req, Res> {
        Network::default()
    }

    /// Binds a transport at `addr` with the given stream buffer capacity.
    pub fn route(&self, addr: impl Into<Address>, capacity: usize) -> MockStreamTransport<Req, Res> {
        MockStreamTransport {
            addr: addr.into(),
            capacity: capacity.max(1),
            state: self.state.clone(),
        }
    }

    /// Makes `addr` unreachable: subsequent opens fail and every live
    /// server task at the address is cancelled.
    pub fn kill(&self, addr: &Address) {
        let mut state = self.state.lock().expect("network state poisoned");
        state.dead.push(addr.clone());
        if let Some(token) = state.tokens.get(addr) {
            token.cancel();
        }
    }
}

pub struct MockStreamTransport<Req, Res> {
    addr: Address,
    capacity: usize,
    state: Arc<Mutex<StreamNetState<Req, Res>>>,
}

#[async_trait]
impl<Req: Send + 'static, Res: Send + 'static> StreamTransport<Req, Res>
    for MockStreamTransport<Req, Res>
{
    async fn stream(&self, target: &Address) -> Result<ClientStream<Req, Res>, TransportError> {
        let (handler, token) = {
            let mut state = self.state.lock().expect("network state poisoned");
            if state.dead.contains(target) {
                return Err(TransportError::Unreachable(target.clone()));
            }
            let handler = state
                .handlers
                .get(target)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable(target.clone()))?;
            let token = state
                .tokens
                .entry(target.clone())
                .or_insert_with(CancellationToken::new)
                .clone();
            (handler, token)
        };
        let (req_tx, req_rx) = mpsc::channel(self.capacity);
        let (res_tx, res_rx) = mpsc::channel(self.capacity);
        let server = ServerStream {
            requests: req_rx,
            responses: res_tx,
        };
        let target = target.clone();
        tokio::spawn(async move {
            tokio::select! {
                // Killing the node drops the server stream, closing both
                // halves under the client.
                _ = token.cancelled() => {}
                result = handler(server) => {
                    if let Err(err) = result {
                        warn!(node = %target, %err, "mock stream handler failed");
                    }
                }
            }
        });
        Ok(ClientStream {
            requests: req_tx,
            responses: res_rx,
        })
    }

    fn handle(&self, handler: StreamHandler<Req, Res>) {
        let mut state = self.state.lock().expect("network state poisoned");
        state.handlers.insert(self.addr.clone(), handler);
    }
}

struct UnaryNetState<Req, Res> {
    handlers: HashMap<Address, UnaryHandler<Req, Res>>,
    dead: Vec<Address>,
}

impl<Req, Res> Default for UnaryNetState<Req, Res> {
    fn default() -> Self {
        UnaryNetState {
            handlers: HashMap::new(),
            dead: Vec::new(),
        }
    }
}

/// An in-process unary network.
pub struct UnaryNetwork<Req, Res> {
    state: Arc<Mutex<UnaryNetState<Req, Res>>>,
}

impl<Req, Res> Clone for UnaryNetwork<Req, Res> {
    fn clone(&self) -> Self {
        UnaryNetwork {
            state: self.state.clone(),
        }
    }
}

impl<Req, Res> Default for UnaryNetwork<Req, Res> {
    fn default() -> Self {
        UnaryNetwork {
            state: Arc::new(Mutex::new(UnaryNetState::default())),
        }
    }
}

impl<Req: Send + 'static, Res: Send + 'static> UnaryNetwork<Req, Res> {
    pub fn new() -> UnaryNetwork<Req, Res> {
        UnaryNetwork::default()
    }

    pub fn route(&self, addr: impl Into<Address>) -> MockUnaryTransport<Req, Res> {
        MockUnaryTransport {
            addr: addr.into(),
            state: self.state.clone(),
        }
    }

    pub fn kill(&self, addr: &Address) {
        let mut state = self.state.lock().expect("network state poisoned");
        state.dead.push(addr.clone());
    }
}

pub struct MockUnaryTransport<Req, Res> {
    addr: Address,
    state: Arc<Mutex<UnaryNetState<Req, Res>>>,
}

#[async_trait]
impl<Req: Send + 'static, Res: Send + 'static> UnaryTransport<Req, Res>
    for MockUnaryTransport<Req, Res>
{
    async fn send(&self, target: &Address, req: Req) -> Result<Res, TransportError> {
        let handler = {
            let state = self.state.lock().expect("network state poisoned");
            if state.dead.contains(target) {
                return Err(TransportError::Unreachable(target.clone()));
            }
            state
                .handlers
                .get(target)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable(target.clone()))?
        };
        handler(req)
            .await
            .map_err(|err| TransportError::Remote(err.to_string()))
    }

    fn handle(&self, handler: UnaryHandler<Req, Res>) {
        let mut state = self.state.lock().expect("network state poisoned");
        state.handlers.insert(self.addr.clone(), handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_round_trip() {
        let net: Network<u32, u32> = Network::new();
        let server_side = net.route("server", 4);
        server_side.handle(Arc::new(|mut stream: ServerStream<u32, u32>| {
            Box::pin(async move {
                while let Some(req) = stream.requests.recv().await {
                    if stream.responses.send(req * 2).await.is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }));

        let client_side = net.route("client", 4);
        let mut stream = client_side.stream(&Address::from("server")).await.unwrap();
        stream.requests.send(21).await.unwrap();
        assert_eq!(stream.responses.recv().await, Some(42));
        // Closing the send half shuts the handler down cleanly.
        drop(stream.requests);
        assert_eq!(stream.responses.recv().await, None);
    }

    #[tokio::test]
    async fn killed_nodes_are_unreachable() {
        let net: Network<u32, u32> = Network::new();
        net.route("server", 1)
            .handle(Arc::new(|_stream| Box::pin(async { Ok(()) })));
        let client = net.route("client", 1);
        net.kill(&Address::from("server"));
        let err = client.stream(&Address::from("server")).await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }

    #[tokio::test]
    async fn unary_round_trip_and_remote_errors() {
        let net: UnaryNetwork<u32, u32> = UnaryNetwork::new();
        net.route("server").handle(Arc::new(|req: u32| {
            Box::pin(async move {
                if req == 0 {
                    anyhow::bail!("zero is not a request");
                }
                Ok(req + 1)
            })
        }));
        let client = net.route("client");
        assert_eq!(client.send(&Address::from("server"), 1).await.unwrap(), 2);
        let err = client.send(&Address::from("server"), 0).await.unwrap_err();
        assert!(matches!(err, TransportError::Remote(_)));
    }
}
