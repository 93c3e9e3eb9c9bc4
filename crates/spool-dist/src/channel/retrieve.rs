//! Channel retrieval builder.
//!
//! Runs against the local view of the metadata store, so results may lag a
//! concurrent creation on another node until propagation completes.

use std::sync::Arc;

use spool_core::{Keys, NodeId};

use crate::channel::{Channel, ChannelStore};
use crate::error::DistError;

pub struct Retrieve {
    store: Arc<dyn ChannelStore>,
    keys: Option<Keys>,
    node_id: Option<NodeId>,
}

impl Retrieve {
    pub(crate) fn new(store: Arc<dyn ChannelStore>) -> Retrieve {
        Retrieve {
            store,
            keys: None,
            node_id: None,
        }
    }

    pub fn where_keys(mut self, keys: Keys) -> Retrieve {
        self.keys = Some(keys);
        self
    }

    pub fn where_node_id(mut self, node_id: NodeId) -> Retrieve {
        self.node_id = Some(node_id);
        self
    }

    pub async fn exec(self) -> Result<Vec<Channel>, DistError> {
        let channels = match &self.keys {
            Some(keys) => self.store.get(keys).await?,
            None => self.store.all().await?,
        };
        Ok(match self.node_id {
            Some(node_id) => channels
                .into_iter()
                .filter(|ch| ch.node_id == node_id)
                .collect(),
            None => channels,
        })
    }

    /// Whether every key in the filter exists in the store.
    pub async fn exists(self) -> Result<bool, DistError> {
        let keys = self
            .keys
            .clone()
            .ok_or_else(|| DistError::Internal("exists requires a key filter".into()))?;
        let mut unique: Vec<_> = keys.0.clone();
        unique.sort();
        unique.dedup();
        let found = self.store.get(&unique).await?;
        Ok(found.len() == unique.len())
    }
}
