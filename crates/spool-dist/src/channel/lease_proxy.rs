//! Creation routing.
//!
//! The lease proxy batches channels by leaseholder. Channels leased to this
//! node are created in-process: the engine allocates keys, then the
//! metadata record is persisted. Channels leased elsewhere are forwarded to
//! their leaseholder over the unary transport, where the peer's proxy runs
//! the same local path. A failure on any leaseholder aborts the whole call;
//! channels already created on other leaseholders are not rolled back.

use std::sync::Arc;

use spool_cluster::{HostResolver, UnaryTransport};
use spool_core::BatchFactory;
use spool_engine::Engine;
use tracing::{debug, info};

use crate::channel::{Channel, ChannelStore, CreateMessage};
use crate::error::DistError;

pub(crate) struct LeaseProxy {
    resolver: Arc<dyn HostResolver>,
    store: Arc<dyn ChannelStore>,
    engine: Arc<dyn Engine>,
    transport: Arc<dyn UnaryTransport<CreateMessage, CreateMessage>>,
}

impl LeaseProxy {
    pub(crate) fn new(
        resolver: Arc<dyn HostResolver>,
        store: Arc<dyn ChannelStore>,
        engine: Arc<dyn Engine>,
        transport: Arc<dyn UnaryTransport<CreateMessage, CreateMessage>>,
    ) -> Arc<LeaseProxy> {
        let proxy = Arc::new(LeaseProxy {
            resolver,
            store,
            engine,
            transport: transport.clone(),
        });
        let handler = proxy.clone();
        transport.handle(Arc::new(move |msg: CreateMessage| {
            let handler = handler.clone();
            Box::pin(async move {
                let channels = handler.create(msg.channels).await?;
                Ok(CreateMessage { channels })
            })
        }));
        proxy
    }

    pub(crate) async fn create(&self, channels: Vec<Channel>) -> Result<Vec<Channel>, DistError> {
        let batch = BatchFactory::new(self.resolver.host_id()).batch(channels);
        let mut created = Vec::new();

        if batch.has_local() {
            let mut local = batch.local;
            for channel in &mut local {
                channel.engine.key = self.engine.create_channel(channel.engine).await?;
            }
            // TODO: roll back engine channel creation if the metadata write
            // fails.
            self.store.upsert(local.clone()).await?;
            info!(count = local.len(), "created channels on host");
            created.extend(local);
        }

        for (node_id, channels) in batch.remote {
            let addr = self.resolver.resolve(node_id)?;
            debug!(%node_id, %addr, count = channels.len(), "forwarding creation to leaseholder");
            let response = self
                .transport
                .send(&addr, CreateMessage { channels })
                .await?;
            created.extend(response.channels);
        }

        Ok(created)
    }
}
