//! Channel definitions and the service that manages them.
//!
//! A channel is a logical time-series identity: a human name, the node that
//! holds its lease, and the engine descriptor the leaseholder stores it
//! under. Creation routes to leaseholders over a unary transport; retrieval
//! runs against the local view of the cluster metadata store.

mod create;
mod lease_proxy;
mod retrieve;
mod store;

pub use create::Create;
pub use retrieve::Retrieve;
pub use store::{ChannelStore, SharedStore};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spool_cluster::{HostResolver, UnaryTransport};
use spool_core::{Address, ChannelKey, Lease, NodeId};
use spool_engine::Engine;

use crate::error::DistError;
use lease_proxy::LeaseProxy;

/// A logical time-series channel. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    #[serde(rename = "nodeID")]
    pub node_id: NodeId,
    #[serde(flatten)]
    pub engine: spool_engine::Channel,
}

impl Channel {
    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(self.node_id, self.engine.key)
    }
}

impl Lease for Channel {
    fn lease(&self) -> NodeId {
        self.node_id
    }
}

/// The unary message used for channel creation. Requests carry channels
/// with unassigned engine keys; responses carry the same channels with the
/// leaseholder-assigned keys filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMessage {
    pub channels: Vec<Channel>,
}

pub type CreateTransport = dyn UnaryTransport<CreateMessage, CreateMessage>;

/// Creates, retrieves, and resolves channels.
pub struct Service {
    resolver: Arc<dyn HostResolver>,
    store: Arc<dyn ChannelStore>,
    proxy: Arc<LeaseProxy>,
}

impl Service {
    /// Builds the service and registers its creation handler on the
    /// transport, so this node serves creation requests for channels it
    /// holds the lease on.
    pub fn new(
        resolver: Arc<dyn HostResolver>,
        store: Arc<dyn ChannelStore>,
        engine: Arc<dyn Engine>,
        transport: Arc<CreateTransport>,
    ) -> Arc<Service> {
        let proxy = LeaseProxy::new(resolver.clone(), store.clone(), engine, transport);
        Arc::new(Service {
            resolver,
            store,
            proxy,
        })
    }

    pub fn host_id(&self) -> NodeId {
        self.resolver.host_id()
    }

    pub fn new_create(&self) -> Create {
        Create::new(self.proxy.clone(), self.resolver.host_id())
    }

    pub fn new_retrieve(&self) -> Retrieve {
        Retrieve::new(self.store.clone())
    }

    /// The network address of a key's leaseholder.
    pub fn resolve(&self, key: ChannelKey) -> Result<Address, DistError> {
        Ok(self.resolver.resolve(key.node_id())?)
    }
}
