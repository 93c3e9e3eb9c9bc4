//! Lease-aware batching.
//!
//! Every operation in the distribution layer starts the same way: take a
//! list of leased entities and split it into the bucket this node can serve
//! locally and one bucket per remote leaseholder. The factory is generic
//! over anything that knows its lease.

use std::collections::BTreeMap;

use crate::node::NodeId;

/// An entity owned by a single leaseholder node.
pub trait Lease {
    fn lease(&self) -> NodeId;
}

/// The result of partitioning entities against a host node: `local` holds
/// the entries leased to the host, `remote` the entries for every other
/// leaseholder. Bucket contents mirror input order; remote buckets iterate
/// in node-ID order.
#[derive(Debug, Clone)]
pub struct Batch<E> {
    pub local: Vec<E>,
    pub remote: BTreeMap<NodeId, Vec<E>>,
}

impl<E> Default for Batch<E> {
    fn default() -> Self {
        Batch {
            local: Vec::new(),
            remote: BTreeMap::new(),
        }
    }
}

impl<E> Batch<E> {
    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }

    pub fn has_remote(&self) -> bool {
        !self.remote.is_empty()
    }

    pub fn remote_node_ids(&self) -> Vec<NodeId> {
        self.remote.keys().copied().collect()
    }
}

/// Partitions leased entities relative to a host node.
#[derive(Debug, Clone, Copy)]
pub struct BatchFactory {
    host: NodeId,
}

impl BatchFactory {
    pub fn new(host: NodeId) -> BatchFactory {
        BatchFactory { host }
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn batch<E: Lease>(&self, entries: impl IntoIterator<Item = E>) -> Batch<E> {
        let mut batch = Batch::default();
        for entry in entries {
            let lease = entry.lease();
            if lease == self.host {
                batch.local.push(entry);
            } else {
                batch.remote.entry(lease).or_default().push(entry);
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Entry(NodeId, u16);

    impl Lease for Entry {
        fn lease(&self) -> NodeId {
            self.0
        }
    }

    #[test]
    fn partitions_by_lease() {
        let factory = BatchFactory::new(NodeId(1));
        let batch = factory.batch(vec![
            Entry(NodeId(1), 1),
            Entry(NodeId(2), 2),
            Entry(NodeId(1), 3),
            Entry(NodeId(3), 4),
            Entry(NodeId(2), 5),
        ]);
        assert_eq!(batch.local, vec![Entry(NodeId(1), 1), Entry(NodeId(1), 3)]);
        assert_eq!(
            batch.remote[&NodeId(2)],
            vec![Entry(NodeId(2), 2), Entry(NodeId(2), 5)]
        );
        assert_eq!(batch.remote[&NodeId(3)], vec![Entry(NodeId(3), 4)]);
        assert_eq!(batch.remote_node_ids(), vec![NodeId(2), NodeId(3)]);
    }

    #[test]
    fn stable_order_within_buckets() {
        let factory = BatchFactory::new(NodeId(9));
        let entries: Vec<Entry> = (0..10).map(|i| Entry(NodeId(2), i)).collect();
        let batch = factory.batch(entries.clone());
        assert!(!batch.has_local());
        assert_eq!(batch.remote[&NodeId(2)], entries);
    }

    #[test]
    fn empty_input_yields_empty_batch() {
        let batch = BatchFactory::new(NodeId(1)).batch(Vec::<Entry>::new());
        assert!(!batch.has_local());
        assert!(!batch.has_remote());
    }
}
