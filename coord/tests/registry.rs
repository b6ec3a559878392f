mod common;

use std::sync::atomic::Ordering;

use coord::core::error::CoordError;
use coord::core::node::NodeStatus;

use crate::common::TestCluster;

#[tokio::test]
async fn test_cached_connection_is_reused_without_probing() -> anyhow::Result<()> {
    let cluster = TestCluster::new(2).await?;
    let registry = cluster.coordinator.registry();
    let node = cluster.node("storage-node-1")?;

    registry.get_connection("storage-node-1").await?;
    assert_eq!(node.calls.load(Ordering::SeqCst), 1);

    let handle = registry.get_connection("storage-node-1").await?;
    assert_eq!(node.calls.load(Ordering::SeqCst), 1);
    assert!(handle.heartbeat().await?);
    assert_eq!(
        registry.health().get("storage-node-1").map(|h| h.status),
        Some(NodeStatus::Healthy)
    );

    Ok(())
}

#[tokio::test]
async fn test_dead_node_is_evicted_and_reconnects_lazily() -> anyhow::Result<()> {
    let cluster = TestCluster::new(2).await?;
    let registry = cluster.coordinator.registry();
    let node = cluster.node("storage-node-2")?;

    registry.get_connection("storage-node-2").await?;
    node.kill();

    // a probe through the cached handle fails and drops it
    assert!(registry.probe("storage-node-2").await.is_none());
    let err = registry.get_connection("storage-node-2").await.err();
    assert_eq!(err, Some(CoordError::NodeUnreachable("storage-node-2".into())));
    assert_eq!(
        registry.health().get("storage-node-2").map(|h| h.status),
        Some(NodeStatus::Unhealthy)
    );

    node.revive();
    let before = node.calls.load(Ordering::SeqCst);
    registry.get_connection("storage-node-2").await?;
    assert_eq!(node.calls.load(Ordering::SeqCst), before + 1);
    assert_eq!(
        registry.health().get("storage-node-2").map(|h| h.status),
        Some(NodeStatus::Healthy)
    );

    Ok(())
}

#[tokio::test]
async fn test_unconfigured_node_is_rejected() -> anyhow::Result<()> {
    let cluster = TestCluster::new(1).await?;

    let err = cluster.coordinator.registry().get_connection("storage-node-9").await.err();
    assert_eq!(err, Some(CoordError::UnknownNode("storage-node-9".into())));

    Ok(())
}
