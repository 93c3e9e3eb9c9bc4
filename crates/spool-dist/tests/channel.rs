//! Channel service scenarios: leaseholder routing, key allocation, and
//! retrieval.

mod support;

use spool_core::{DataRate, DataType, Keys, NodeId};
use spool_engine::Engine;
use support::TestCluster;

#[tokio::test]
async fn create_routes_to_the_leaseholder() {
    let cluster = TestCluster::new(2);
    // Issued on node 2, leased to node 1: the creation crosses the unary
    // transport.
    let channel = cluster.create_channel(2, 1).await;
    assert_eq!(channel.node_id, NodeId(1));
    assert_eq!(channel.key().node_id(), NodeId(1));

    // The leaseholder's engine knows the channel; the issuing node's does
    // not.
    assert!(cluster
        .node(1)
        .engine
        .channels(&[channel.engine.key])
        .await
        .is_ok());
    assert!(cluster
        .node(2)
        .engine
        .channels(&[channel.engine.key])
        .await
        .is_err());
}

#[tokio::test]
async fn create_assigns_strictly_increasing_engine_keys() {
    let cluster = TestCluster::new(2);
    let channels = cluster
        .node(2)
        .service
        .new_create()
        .name("SG02")
        .data_rate(DataRate::hz(25.0))
        .data_type(DataType::Float64)
        .node_id(NodeId(1))
        .exec_n(3)
        .await
        .unwrap();
    assert_eq!(channels.len(), 3);
    for pair in channels.windows(2) {
        assert!(pair[0].engine.key.0 < pair[1].engine.key.0);
    }
}

#[tokio::test]
async fn create_defaults_to_the_host_leaseholder() {
    let cluster = TestCluster::new(2);
    let channel = cluster
        .node(2)
        .service
        .new_create()
        .name("SG01")
        .data_rate(DataRate::hz(1.0))
        .data_type(DataType::Float32)
        .exec()
        .await
        .unwrap();
    assert_eq!(channel.node_id, NodeId(2));
}

#[tokio::test]
async fn retrieve_filters_by_keys_and_node() {
    let cluster = TestCluster::new(2);
    let c1 = cluster.create_channel(1, 1).await;
    let c2 = cluster.create_channel(1, 2).await;

    let by_key = cluster
        .node(2)
        .service
        .new_retrieve()
        .where_keys(Keys::new(vec![c1.key()]))
        .exec()
        .await
        .unwrap();
    assert_eq!(by_key.len(), 1);
    assert_eq!(by_key[0].key(), c1.key());

    let by_node = cluster
        .node(1)
        .service
        .new_retrieve()
        .where_node_id(NodeId(2))
        .exec()
        .await
        .unwrap();
    assert_eq!(by_node.len(), 1);
    assert_eq!(by_node[0].key(), c2.key());

    let exists = cluster
        .node(1)
        .service
        .new_retrieve()
        .where_keys(Keys::new(vec![c1.key(), c2.key()]))
        .exists()
        .await
        .unwrap();
    assert!(exists);

    let missing = spool_core::ChannelKey::new(NodeId(1), spool_core::EngineKey(40));
    let exists = cluster
        .node(1)
        .service
        .new_retrieve()
        .where_keys(Keys::new(vec![c1.key(), missing]))
        .exists()
        .await
        .unwrap();
    assert!(!exists);
}

#[tokio::test]
async fn resolve_returns_the_leaseholder_address() {
    let cluster = TestCluster::new(2);
    let channel = cluster.create_channel(1, 2).await;
    let addr = cluster.node(1).service.resolve(channel.key()).unwrap();
    assert_eq!(addr, cluster.node(2).addr);
}

#[tokio::test]
async fn create_fails_when_the_leaseholder_is_unreachable() {
    let cluster = TestCluster::new(2);
    cluster.kill(2);
    let result = cluster
        .node(1)
        .service
        .new_create()
        .name("SG03")
        .data_rate(DataRate::hz(1.0))
        .data_type(DataType::Float64)
        .node_id(NodeId(2))
        .exec()
        .await;
    assert!(result.is_err());
}
