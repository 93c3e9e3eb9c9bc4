//! Cluster membership, at the interface the distribution layer consumes.

use std::collections::HashMap;

use spool_core::{Address, NodeId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("node {0} is not a cluster member")]
    UnknownNode(NodeId),
}

/// Resolves node identity and addresses. Implemented over the membership
/// substrate; the distribution layer only ever asks these two questions.
pub trait HostResolver: Send + Sync {
    /// The ID of the node this resolver runs on.
    fn host_id(&self) -> NodeId;

    /// The network address of a cluster member.
    fn resolve(&self, id: NodeId) -> Result<Address, ClusterError>;
}

pub type AddressMap = HashMap<NodeId, Address>;

/// Resolves the addresses of a set of nodes up front, for components that
/// route by node ID on a hot path.
pub fn resolve_address_map(
    resolver: &dyn HostResolver,
    ids: impl IntoIterator<Item = NodeId>,
) -> Result<AddressMap, ClusterError> {
    let mut map = AddressMap::new();
    for id in ids {
        map.insert(id, resolver.resolve(id)?);
    }
    Ok(map)
}

/// Fixed membership fed from configuration. Stands in for the gossip
/// substrate, which is out of scope for the distribution layer.
#[derive(Debug, Clone)]
pub struct StaticCluster {
    host: NodeId,
    members: HashMap<NodeId, Address>,
}

impl StaticCluster {
    pub fn new(host: NodeId) -> StaticCluster {
        StaticCluster {
            host,
            members: HashMap::new(),
        }
    }

    pub fn with_member(mut self, id: NodeId, addr: impl Into<Address>) -> StaticCluster {
        self.members.insert(id, addr.into());
        self
    }
}

impl HostResolver for StaticCluster {
    fn host_id(&self) -> NodeId {
        self.host
    }

    fn resolve(&self, id: NodeId) -> Result<Address, ClusterError> {
        self.members
            .get(&id)
            .cloned()
            .ok_or(ClusterError::UnknownNode(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_members_and_rejects_strangers() {
        let cluster = StaticCluster::new(NodeId(1))
            .with_member(NodeId(1), "node1:9090")
            .with_member(NodeId(2), "node2:9090");
        assert_eq!(cluster.host_id(), NodeId(1));
        assert_eq!(cluster.resolve(NodeId(2)).unwrap(), Address::from("node2:9090"));
        assert_eq!(
            cluster.resolve(NodeId(3)).unwrap_err(),
            ClusterError::UnknownNode(NodeId(3))
        );
    }

    #[test]
    fn address_map_resolves_all_or_fails() {
        let cluster = StaticCluster::new(NodeId(1)).with_member(NodeId(2), "node2:9090");
        let map = resolve_address_map(&cluster, [NodeId(2)]).unwrap();
        assert_eq!(map[&NodeId(2)], Address::from("node2:9090"));
        assert!(resolve_address_map(&cluster, [NodeId(2), NodeId(9)]).is_err());
    }
}
