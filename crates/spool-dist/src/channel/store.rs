//! The cluster metadata store, at the interface the channel service
//! consumes. Replication and transaction discipline belong to the store
//! itself; the distribution layer treats both as opaque.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use spool_core::ChannelKey;

use crate::channel::Channel;
use crate::error::DistError;

#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Persists channel records keyed by channel key.
    async fn upsert(&self, channels: Vec<Channel>) -> Result<(), DistError>;

    /// Returns the records found for `keys`, skipping absent ones.
    async fn get(&self, keys: &[ChannelKey]) -> Result<Vec<Channel>, DistError>;

    async fn all(&self) -> Result<Vec<Channel>, DistError>;
}

/// A memory-backed store. Cloning shares the underlying map, which is how
/// tests model a metadata store that has finished propagating clusterwide.
#[derive(Clone, Default)]
pub struct SharedStore {
    inner: Arc<RwLock<BTreeMap<ChannelKey, Channel>>>,
}

impl SharedStore {
    pub fn new() -> SharedStore {
        SharedStore::default()
    }
}

#[async_trait]
impl ChannelStore for SharedStore {
    async fn upsert(&self, channels: Vec<Channel>) -> Result<(), DistError> {
        let mut inner = self.inner.write().expect("channel store poisoned");
        for channel in channels {
            inner.insert(channel.key(), channel);
        }
        Ok(())
    }

    async fn get(&self, keys: &[ChannelKey]) -> Result<Vec<Channel>, DistError> {
        let inner = self.inner.read().expect("channel store poisoned");
        Ok(keys.iter().filter_map(|k| inner.get(k).cloned()).collect())
    }

    async fn all(&self) -> Result<Vec<Channel>, DistError> {
        let inner = self.inner.read().expect("channel store poisoned");
        Ok(inner.values().cloned().collect())
    }
}
