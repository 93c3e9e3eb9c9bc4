//! Channel creation builder.

use std::sync::Arc;

use spool_core::{DataRate, DataType, NodeId};

use crate::channel::{lease_proxy::LeaseProxy, Channel};
use crate::error::DistError;

/// Assembles and executes a channel creation. The leaseholder defaults to
/// the host node when none is given.
pub struct Create {
    proxy: Arc<LeaseProxy>,
    host: NodeId,
    name: String,
    node_id: NodeId,
    data_rate: DataRate,
    data_type: DataType,
}

impl Create {
    pub(crate) fn new(proxy: Arc<LeaseProxy>, host: NodeId) -> Create {
        Create {
            proxy,
            host,
            name: String::new(),
            node_id: NodeId(0),
            data_rate: DataRate::default(),
            data_type: DataType::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Create {
        self.name = name.into();
        self
    }

    pub fn node_id(mut self, node_id: NodeId) -> Create {
        self.node_id = node_id;
        self
    }

    pub fn data_rate(mut self, data_rate: DataRate) -> Create {
        self.data_rate = data_rate;
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Create {
        self.data_type = data_type;
        self
    }

    pub async fn exec(self) -> Result<Channel, DistError> {
        let mut channels = self.exec_n(1).await?;
        Ok(channels.remove(0))
    }

    /// Creates `n` channels with identical parameters on the leaseholder.
    pub async fn exec_n(self, n: usize) -> Result<Vec<Channel>, DistError> {
        let node_id = if self.node_id.is_unassigned() {
            self.host
        } else {
            self.node_id
        };
        let channels = (0..n)
            .map(|_| Channel {
                name: self.name.clone(),
                node_id,
                engine: spool_engine::Channel::new(self.data_rate, self.data_type),
            })
            .collect();
        self.proxy.create(channels).await
    }
}
