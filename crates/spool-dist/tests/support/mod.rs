//! Test cluster: per-node in-memory engines, a shared metadata store, and
//! an in-process network, with the channel service and the iterator/writer
//! servers stood up on every node.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use spool_cluster::mock::{MockUnaryTransport, Network, UnaryNetwork};
use spool_cluster::{HostResolver, StaticCluster};
use spool_core::{Address, DataRate, DataType, Keys, NodeId, TimeSpan, TimeStamp};
use spool_dist::channel::{Channel, CreateMessage, Service, SharedStore};
use spool_dist::iterator::{
    serve_iterator, IteratorConfig, IteratorTransport, Response, SegmentIterator,
};
use spool_dist::writer::{serve_writer, WriterTransport};
use spool_dist::DistError;
use spool_engine::{Engine, MemEngine, Segment};

pub const SEGMENT_SPAN: TimeSpan = TimeSpan(10 * 1_000_000_000);

pub struct TestNode {
    pub id: NodeId,
    pub addr: Address,
    pub engine: MemEngine,
    pub service: Arc<Service>,
    pub resolver: Arc<dyn HostResolver>,
    pub iter_transport: Arc<IteratorTransport>,
    pub writer_transport: Arc<WriterTransport>,
}

pub struct TestCluster {
    pub iter_net: Network<spool_dist::iterator::Request, spool_dist::iterator::Response>,
    pub writer_net: Network<spool_dist::writer::Request, spool_dist::writer::Response>,
    pub create_net: UnaryNetwork<CreateMessage, CreateMessage>,
    pub store: SharedStore,
    pub nodes: BTreeMap<NodeId, TestNode>,
}

impl TestCluster {
    pub fn new(size: u32) -> TestCluster {
        let iter_net = Network::new();
        let writer_net = Network::new();
        let create_net = UnaryNetwork::new();
        let store = SharedStore::new();

        let members: Vec<(NodeId, Address)> = (1..=size)
            .map(|i| (NodeId(i), Address::from(format!("node-{i}"))))
            .collect();

        let mut nodes = BTreeMap::new();
        for (id, addr) in &members {
            let mut cluster = StaticCluster::new(*id);
            for (m_id, m_addr) in &members {
                cluster = cluster.with_member(*m_id, m_addr.clone());
            }
            let resolver: Arc<dyn HostResolver> = Arc::new(cluster);
            let engine = MemEngine::new();
            let engine_dyn: Arc<dyn Engine> = Arc::new(engine.clone());

            let iter_transport: Arc<IteratorTransport> =
                Arc::new(iter_net.route(addr.clone(), 10));
            let writer_transport: Arc<WriterTransport> =
                Arc::new(writer_net.route(addr.clone(), 10));
            let create_transport: MockUnaryTransport<CreateMessage, CreateMessage> =
                create_net.route(addr.clone());

            serve_iterator(*id, engine_dyn.clone(), iter_transport.as_ref());
            serve_writer(*id, engine_dyn.clone(), writer_transport.as_ref());

            let service = Service::new(
                resolver.clone(),
                Arc::new(store.clone()),
                engine_dyn,
                Arc::new(create_transport),
            );

            nodes.insert(
                *id,
                TestNode {
                    id: *id,
                    addr: addr.clone(),
                    engine,
                    service,
                    resolver,
                    iter_transport,
                    writer_transport,
                },
            );
        }

        TestCluster {
            iter_net,
            writer_net,
            create_net,
            store,
            nodes,
        }
    }

    pub fn node(&self, id: u32) -> &TestNode {
        &self.nodes[&NodeId(id)]
    }

    /// Creates a float64 channel at 25 Hz leased to `leaseholder`, issuing
    /// the creation through `via`'s service.
    pub async fn create_channel(&self, via: u32, leaseholder: u32) -> Channel {
        self.node(via)
            .service
            .new_create()
            .name("SG02")
            .data_rate(DataRate::hz(25.0))
            .data_type(DataType::Float64)
            .node_id(NodeId(leaseholder))
            .exec()
            .await
            .expect("channel creation failed")
    }

    /// Writes `count` contiguous 10 s segments starting at t=0 straight
    /// into the leaseholder's engine.
    pub async fn seed_segments(&self, channel: &Channel, count: usize) {
        let engine = &self.node(channel.node_id.0).engine;
        let mut writer = engine
            .open_writer(vec![channel.engine.key])
            .await
            .expect("failed to open seed writer");
        for i in 0..count {
            let start = TimeStamp(0) + SEGMENT_SPAN * i as i64;
            writer
                .write(vec![Segment::new(
                    channel.engine.key,
                    start,
                    random_payload(250 * 8),
                )])
                .await
                .expect("seed write failed");
        }
        writer.close().await.expect("seed writer close failed");
    }

    /// Opens an iterator on `host` over `keys` across all of time.
    pub async fn open_iterator(
        &self,
        host: u32,
        keys: Keys,
    ) -> Result<SegmentIterator, DistError> {
        let node = self.node(host);
        SegmentIterator::open(
            Arc::new(node.engine.clone()),
            &node.service,
            node.resolver.clone(),
            node.iter_transport.clone(),
            spool_core::TimeRange::MAX,
            keys,
            IteratorConfig::default(),
        )
        .await
    }

    pub fn kill(&self, node_id: u32) {
        let addr = Address::from(format!("node-{node_id}"));
        self.iter_net.kill(&addr);
        self.writer_net.kill(&addr);
        self.create_net.kill(&addr);
    }
}

pub fn random_payload(len: usize) -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// Collects `count` data responses, asserting each carries
/// `segments_per_response` segments, then asserts the stream stays quiet.
pub async fn expect_responses(
    responses: &mut tokio::sync::mpsc::Receiver<Response>,
    count: usize,
    segments_per_response: usize,
) -> Vec<Response> {
    let mut collected = Vec::with_capacity(count);
    for i in 0..count {
        let response = tokio::time::timeout(Duration::from_secs(2), responses.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for response {}/{count}", i + 1))
            .unwrap_or_else(|| panic!("response stream closed at {}/{count}", i + 1));
        assert_eq!(
            response.variant,
            spool_dist::iterator::ResponseVariant::Data,
            "acknowledgement leaked onto the external output"
        );
        assert_eq!(
            response.segments.len(),
            segments_per_response,
            "unexpected segment count in response {}",
            i + 1
        );
        collected.push(response);
    }
    // No extras.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        responses.try_recv().is_err(),
        "expected no further responses"
    );
    collected
}
