//! Cross-node iterator scenarios over the in-process network.

mod support;

use std::time::Duration;

use spool_core::{telem::SECOND, Keys, TimeRange, TimeStamp};
use spool_dist::DistError;
use support::{expect_responses, TestCluster, SEGMENT_SPAN};

#[tokio::test]
async fn two_node_single_channel_read() {
    let cluster = TestCluster::new(2);
    let channel = cluster.create_channel(2, 1).await;
    cluster.seed_segments(&channel, 10).await;

    // Node 2 holds no lease here, so every request crosses the network.
    let mut iter = cluster
        .open_iterator(2, Keys::new(vec![channel.key()]))
        .await
        .unwrap();

    assert!(iter.first().await);
    let responses = expect_responses(iter.responses(), 1, 1).await;
    assert_eq!(responses[0].segments[0].channel_key, channel.key());
    assert_eq!(responses[0].segments[0].start, TimeStamp(0));

    assert!(iter.next().await);
    let responses = expect_responses(iter.responses(), 1, 1).await;
    assert_eq!(responses[0].segments[0].start, TimeStamp(0) + SEGMENT_SPAN);

    // No leaseholder has accumulated an error.
    assert!(iter.error().await.is_none());

    let mut output = iter.take_responses();
    iter.close().await.unwrap();
    // After close the external output is closed and quiet.
    assert!(output.recv().await.is_none());
}

#[tokio::test]
async fn cross_node_multi_channel_span() {
    let cluster = TestCluster::new(2);
    let c1 = cluster.create_channel(2, 1).await;
    let c2 = cluster.create_channel(2, 2).await;
    cluster.seed_segments(&c1, 10).await;
    cluster.seed_segments(&c2, 10).await;

    // Node 2 leases c2, so the pipeline runs both a local and a remote
    // client behind the broadcaster.
    let mut iter = cluster
        .open_iterator(2, Keys::new(vec![c1.key(), c2.key()]))
        .await
        .unwrap();

    assert!(iter.seek_first().await);
    assert!(iter.next_span(SECOND * 20).await);

    let responses = expect_responses(iter.responses(), 4, 1).await;
    // Two segments per channel, and each leaseholder's pair arrives in
    // start order.
    for channel in [&c1, &c2] {
        let starts: Vec<TimeStamp> = responses
            .iter()
            .flat_map(|r| &r.segments)
            .filter(|s| s.channel_key == channel.key())
            .map(|s| s.start)
            .collect();
        assert_eq!(starts, vec![TimeStamp(0), TimeStamp(0) + SEGMENT_SPAN]);
    }

    iter.close().await.unwrap();
}

#[tokio::test]
async fn exhaustive_read_preserves_order() {
    let cluster = TestCluster::new(1);
    let channel = cluster.create_channel(1, 1).await;
    cluster.seed_segments(&channel, 100).await;

    let mut iter = cluster
        .open_iterator(1, Keys::new(vec![channel.key()]))
        .await
        .unwrap();

    // Drain concurrently: the backpressured output would otherwise stall
    // the exhaust ack behind a full buffer.
    let mut output = iter.take_responses();
    let collector = tokio::spawn(async move {
        let mut segments = Vec::new();
        while let Some(response) = output.recv().await {
            segments.extend(response.segments);
        }
        segments
    });

    assert!(iter.first().await);
    assert!(iter.exhaust().await);
    assert!(!iter.valid().await);
    iter.close().await.unwrap();

    let segments = collector.await.unwrap();
    assert_eq!(segments.len(), 100);
    for (i, segment) in segments.iter().enumerate() {
        assert_eq!(segment.start, TimeStamp(0) + SEGMENT_SPAN * i as i64);
    }
}

#[tokio::test]
async fn next_range_emits_intersecting_segments() {
    let cluster = TestCluster::new(1);
    let channel = cluster.create_channel(1, 1).await;
    cluster.seed_segments(&channel, 10).await;

    let mut iter = cluster
        .open_iterator(1, Keys::new(vec![channel.key()]))
        .await
        .unwrap();

    let range = TimeRange::new(TimeStamp(0), TimeStamp(0) + SECOND * 30);
    assert!(iter.next_range(range).await);
    let responses = expect_responses(iter.responses(), 3, 1).await;
    let starts: Vec<TimeStamp> = responses.iter().map(|r| r.segments[0].start).collect();
    assert_eq!(
        starts,
        vec![
            TimeStamp(0),
            TimeStamp(0) + SEGMENT_SPAN,
            TimeStamp(0) + SEGMENT_SPAN * 2
        ]
    );

    iter.close().await.unwrap();
}

#[tokio::test]
async fn open_fails_on_unknown_keys() {
    let cluster = TestCluster::new(2);
    let channel = cluster.create_channel(1, 1).await;
    let mut keys = vec![channel.key()];
    keys.push(spool_core::ChannelKey::new(
        spool_core::NodeId(2),
        spool_core::EngineKey(40),
    ));
    let err = cluster.open_iterator(1, Keys::new(keys)).await.unwrap_err();
    assert!(matches!(err, DistError::NotFound(_)));
}

#[tokio::test]
async fn unreachable_leaseholder_fails_fast_and_surfaces_on_close() {
    let cluster = TestCluster::new(2);
    let channel = cluster.create_channel(1, 2).await;
    cluster.seed_segments(&channel, 10).await;

    let mut iter = cluster
        .open_iterator(1, Keys::new(vec![channel.key()]))
        .await
        .unwrap();
    assert!(iter.first().await);
    expect_responses(iter.responses(), 1, 1).await;

    cluster.kill(2);
    // Let the kill tear the server task down before the next command.
    tokio::time::sleep(Duration::from_millis(50)).await;
    // The dead peer cannot ack, so the command fails within the
    // synchronizer's bound.
    let failed = tokio::time::timeout(Duration::from_secs(3), iter.next())
        .await
        .expect("traversal did not fail within the synchronizer timeout");
    assert!(!failed);

    let err = iter.close().await.unwrap_err();
    assert!(matches!(err, DistError::Unreachable(node, _) if node == spool_core::NodeId(2)));
}
