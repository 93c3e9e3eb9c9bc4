//! TCP transport.
//!
//! Frames are length-delimited with JSON payloads. A node runs one
//! `TcpServer`; each logical transport (iterator streams, writer streams,
//! channel creation) registers under a service name, and the first frame of
//! every connection names the service the peer wants. Closing the write
//! half of a stream is the normal end-of-stream signal, mirroring the mpsc
//! semantics of the in-process network.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use spool_core::Address;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{
    ClientStream, ServerStream, StreamHandler, StreamTransport, TransportError, UnaryHandler,
    UnaryTransport,
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STREAM_CAPACITY: usize = 10;

type Wire = Framed<TcpStream, LengthDelimitedCodec>;
type RawHandler = Arc<dyn Fn(Wire) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

fn encode<T: Serialize>(value: &T) -> Result<Bytes, TransportError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|err| TransportError::Codec(err.to_string()))
}

fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, TransportError> {
    serde_json::from_slice(frame).map_err(|err| TransportError::Codec(err.to_string()))
}

/// Accepts connections and dispatches them to registered services by the
/// service name carried in the connection's first frame.
#[derive(Clone, Default)]
pub struct TcpServer {
    services: Arc<Mutex<HashMap<String, RawHandler>>>,
}

impl TcpServer {
    pub fn new() -> TcpServer {
        TcpServer::default()
    }

    fn register(&self, service: &str, handler: RawHandler) {
        let mut services = self.services.lock().expect("service registry poisoned");
        services.insert(service.to_string(), handler);
    }

    /// Runs the accept loop until the token cancels.
    pub async fn serve(
        &self,
        listen: &Address,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let listener = TcpListener::bind(listen.as_str()).await?;
        info!(%listen, "transport server listening");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    let (conn, peer) = accepted?;
                    debug!(%peer, "accepted transport connection");
                    let services = self.services.clone();
                    tokio::spawn(async move {
                        if let Err(err) = dispatch(services, conn).await {
                            warn!(%peer, %err, "transport connection failed");
                        }
                    });
                }
            }
        }
    }
}

async fn dispatch(
    services: Arc<Mutex<HashMap<String, RawHandler>>>,
    conn: TcpStream,
) -> anyhow::Result<()> {
    let mut wire = Framed::new(conn, LengthDelimitedCodec::new());
    let name_frame = match wire.next().await {
        Some(frame) => frame?,
        None => return Ok(()),
    };
    let service = String::from_utf8(name_frame.to_vec())?;
    let handler = {
        let services = services.lock().expect("service registry poisoned");
        services
            .get(&service)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown service {service:?}"))?
    };
    handler(wire).await
}

/// A bidirectional stream transport over one registered service.
pub struct TcpStreamTransport<Req, Res> {
    service: String,
    server: TcpServer,
    connect_timeout: Duration,
    capacity: usize,
    _marker: PhantomData<fn(Req) -> Res>,
}

impl<Req, Res> TcpStreamTransport<Req, Res> {
    pub fn new(server: &TcpServer, service: &str) -> TcpStreamTransport<Req, Res> {
        TcpStreamTransport {
            service: service.to_string(),
            server: server.clone(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            capacity: DEFAULT_STREAM_CAPACITY,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Res> StreamTransport<Req, Res> for TcpStreamTransport<Req, Res>
where
    Req: Serialize + DeserializeOwned + Send + 'static,
    Res: Serialize + DeserializeOwned + Send + 'static,
{
    async fn stream(&self, target: &Address) -> Result<ClientStream<Req, Res>, TransportError> {
        let conn = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(target.clone()))?
            .map_err(|_| TransportError::Unreachable(target.clone()))?;
        let mut wire = Framed::new(conn, LengthDelimitedCodec::new());
        wire.send(Bytes::from(self.service.clone()))
            .await
            .map_err(|_| TransportError::Unreachable(target.clone()))?;

        let (mut sink, mut stream) = wire.split();
        let (req_tx, mut req_rx) = mpsc::channel::<Req>(self.capacity);
        let (res_tx, res_rx) = mpsc::channel::<Res>(self.capacity);

        tokio::spawn(async move {
            while let Some(req) = req_rx.recv().await {
                let frame = match encode(&req) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(%err, "dropping unencodable request");
                        break;
                    }
                };
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            // Request inlet closed: propagate end-of-stream to the peer.
            let _ = sink.close().await;
        });
        tokio::spawn(async move {
            while let Some(Ok(frame)) = stream.next().await {
                match decode::<Res>(&frame) {
                    Ok(res) => {
                        if res_tx.send(res).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "dropping undecodable response");
                        break;
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
        let capacity = self.capacity;
        self.server.register(
            &self.service,
            Arc::new(move |wire: Wire| {
                let handler = handler.clone();
                Box::pin(async move {
                    let (mut sink, mut stream) = wire.split();
                    let (req_tx, req_rx) = mpsc::channel::<Req>(capacity);
                    let (res_tx, mut res_rx) = mpsc::channel::<Res>(capacity);

                    let reader = tokio::spawn(async move {
                        while let Some(Ok(frame)) = stream.next().await {
                            let Ok(req) = decode::<Req>(&frame) else { break };
                            if req_tx.send(req).await.is_err() {
                                break;
                            }
                        }
                    });
                    let writer = tokio::spawn(async move {
                        while let Some(res) = res_rx.recv().await {
                            let Ok(frame) = encode(&res) else { break };
                            if sink.send(frame).await.is_err() {
                                break;
                            }
                        }
                        let _ = sink.close().await;
                    });

                    let result = handler(ServerStream {
                        requests: req_rx,
                        responses: res_tx,
                    })
                    .await;

                    let _ = writer.await;
                    reader.abort();
                    result
                })
            }),
        );
    }
}

/// Wire shape of a unary reply.
#[derive(Serialize, Deserialize)]
enum Reply<T> {
    #[serde(rename = "ok")]
    Ok(T),
    #[serde(rename = "err")]
    Err(String),
}

/// A unary transport over one registered service. Each request opens a
/// short-lived connection carrying the service frame, the request, and the
/// reply.
pub struct TcpUnaryTransport<Req, Res> {
    service: String,
    server: TcpServer,
    connect_timeout: Duration,
    _marker: PhantomData<fn(Req) -> Res>,
}

impl<Req, Res> TcpUnaryTransport<Req, Res> {
    pub fn new(server: &TcpServer, service: &str) -> TcpUnaryTransport<Req, Res> {
        TcpUnaryTransport {
            service: service.to_string(),
            server: server.clone(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Res> UnaryTransport<Req, Res> for TcpUnaryTransport<Req, Res>
where
    Req: Serialize + DeserializeOwned + Send + 'static,
    Res: Serialize + DeserializeOwned + Send + 'static,
{
    async fn send(&self, target: &Address, req: Req) -> Result<Res, TransportError> {
        let conn = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(target.clone()))?
            .map_err(|_| TransportError::Unreachable(target.clone()))?;
        let mut wire = Framed::new(conn, LengthDelimitedCodec::new());
        wire.send(Bytes::from(self.service.clone()))
            .await
            .map_err(|_| TransportError::Unreachable(target.clone()))?;
        wire.send(encode(&req)?)
            .await
            .map_err(|_| TransportError::Unreachable(target.clone()))?;
        let frame = wire
            .next()
            .await
            .ok_or_else(|| TransportError::Unreachable(target.clone()))?
            .map_err(|_| TransportError::Unreachable(target.clone()))?;
        match decode::<Reply<Res>>(&frame)? {
            Reply::Ok(res) => Ok(res),
            Reply::Err(err) => Err(TransportError::Remote(err)),
        }
    }

    fn handle(&self, handler: UnaryHandler<Req, Res>) {
        self.server.register(
            &self.service,
            Arc::new(move |mut wire: Wire| {
                let handler = handler.clone();
                Box::pin(async move {
                    let frame = match wire.next().await {
                        Some(frame) => frame?,
                        None => return Ok(()),
                    };
                    let req = decode::<Req>(&frame)?;
                    let reply = match handler(req).await {
                        Ok(res) => Reply::Ok(res),
                        Err(err) => Reply::Err(err.to_string()),
                    };
                    wire.send(encode(&reply)?).await?;
                    Ok(())
                })
            }),
        );
    }
}
