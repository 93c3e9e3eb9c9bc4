//! Cross-node writer scenarios over the in-process network.

mod support;

use std::time::Duration;

use spool_core::{Keys, TimeStamp};
use spool_dist::writer::{Request, Response, SegmentWriter};
use spool_dist::{DistError, Segment};
use spool_engine::Engine;
use support::{random_payload, TestCluster};

async fn open_writer(
    cluster: &TestCluster,
    host: u32,
    keys: Keys,
    input: tokio::sync::mpsc::Receiver<Request>,
    output: tokio::sync::mpsc::Sender<Response>,
) -> Result<SegmentWriter, DistError> {
    let node = cluster.node(host);
    SegmentWriter::open(
        std::sync::Arc::new(node.engine.clone()),
        &node.service,
        node.resolver.clone(),
        node.writer_transport.clone(),
        keys,
        input,
        output,
    )
    .await
}

#[tokio::test]
async fn fans_segments_out_to_remote_leaseholders() {
    let cluster = TestCluster::new(3);
    let c1 = cluster.create_channel(3, 1).await;
    let c2 = cluster.create_channel(3, 2).await;

    let (input_tx, input_rx) = tokio::sync::mpsc::channel(4);
    let (output_tx, mut output_rx) = tokio::sync::mpsc::channel(4);
    let mut writer = open_writer(
        &cluster,
        3,
        Keys::new(vec![c1.key(), c2.key()]),
        input_rx,
        output_tx,
    )
    .await
    .unwrap();

    let s1 = Segment::new(c1.key(), TimeStamp(0), random_payload(8 * 10));
    let s2 = Segment::new(c2.key(), TimeStamp(0), random_payload(8 * 10));
    input_tx
        .send(Request::data(vec![s1.clone(), s2.clone()]))
        .await
        .unwrap();
    drop(input_tx);
    writer.wait().await.unwrap();

    // Each leaseholder holds exactly the subset it owns.
    let node1_segments = cluster
        .node(1)
        .engine
        .read_segments(c1.engine.key)
        .await
        .unwrap();
    assert_eq!(node1_segments, vec![s1.to_engine()]);
    let node2_segments = cluster
        .node(2)
        .engine
        .read_segments(c2.engine.key)
        .await
        .unwrap();
    assert_eq!(node2_segments, vec![s2.to_engine()]);
    // Node 3 leases neither channel and must hold nothing.
    assert!(cluster
        .node(3)
        .engine
        .read_segments(c1.engine.key)
        .await
        .is_err());

    // The response stream closes without a single error.
    let response = tokio::time::timeout(Duration::from_secs(2), output_rx.recv())
        .await
        .expect("response stream did not close");
    assert!(response.is_none(), "unexpected error response: {response:?}");
}

#[tokio::test]
async fn splits_between_local_and_remote_writers() {
    let cluster = TestCluster::new(2);
    let c1 = cluster.create_channel(1, 1).await;
    let c2 = cluster.create_channel(1, 2).await;

    let (input_tx, input_rx) = tokio::sync::mpsc::channel(4);
    let (output_tx, mut output_rx) = tokio::sync::mpsc::channel(4);
    let mut writer = open_writer(
        &cluster,
        1,
        Keys::new(vec![c1.key(), c2.key()]),
        input_rx,
        output_tx,
    )
    .await
    .unwrap();

    // Two requests, each mixing both leaseholders.
    for i in 0..2i64 {
        let start = TimeStamp(i * 1_000_000_000);
        input_tx
            .send(Request::data(vec![
                Segment::new(c1.key(), start, random_payload(8)),
                Segment::new(c2.key(), start, random_payload(8)),
            ]))
            .await
            .unwrap();
    }
    drop(input_tx);
    writer.wait().await.unwrap();

    for (node, channel) in [(1u32, &c1), (2u32, &c2)] {
        let stored = cluster
            .node(node)
            .engine
            .read_segments(channel.engine.key)
            .await
            .unwrap();
        let starts: Vec<i64> = stored.iter().map(|s| s.start.0).collect();
        assert_eq!(starts, vec![0, 1_000_000_000], "node {node}");
    }
    assert!(output_rx.recv().await.is_none());
}

#[tokio::test]
async fn concurrent_open_surfaces_locked() {
    let cluster = TestCluster::new(1);
    let channel = cluster.create_channel(1, 1).await;

    let (_w1_tx, w1_rx) = tokio::sync::mpsc::channel(1);
    let (w1_out, _w1_out_rx) = tokio::sync::mpsc::channel(1);
    let _w1 = open_writer(&cluster, 1, Keys::new(vec![channel.key()]), w1_rx, w1_out)
        .await
        .unwrap();

    let (_w2_tx, w2_rx) = tokio::sync::mpsc::channel(1);
    let (w2_out, _w2_out_rx) = tokio::sync::mpsc::channel(1);
    let err = open_writer(&cluster, 1, Keys::new(vec![channel.key()]), w2_rx, w2_out)
        .await
        .unwrap_err();
    assert!(matches!(err, DistError::Locked(_)));
}

#[tokio::test]
async fn open_fails_on_unknown_keys() {
    let cluster = TestCluster::new(1);
    let key = spool_core::ChannelKey::new(spool_core::NodeId(1), spool_core::EngineKey(9));
    let (_input_tx, input_rx) = tokio::sync::mpsc::channel(1);
    let (output_tx, _output_rx) = tokio::sync::mpsc::channel(1);
    let err = open_writer(&cluster, 1, Keys::new(vec![key]), input_rx, output_tx)
        .await
        .unwrap_err();
    assert!(matches!(err, DistError::NotFound(_)));
}
