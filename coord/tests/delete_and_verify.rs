mod common;

use coord::core::coordinator::CoordinatorConfig;
use coord::core::error::CoordError;
use coord::core::integrity::IntegrityStatus;

use crate::common::{TestCluster, payload};

fn full_replication(n: usize) -> CoordinatorConfig {
    CoordinatorConfig {
        replication_factor: n,
        ..CoordinatorConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_reaches_every_holder() -> anyhow::Result<()> {
    let cluster = TestCluster::new(3).await?;
    let stored = cluster.coordinator.store_file("gone.txt", payload(100, 4)).await?;

    let deleted = cluster.coordinator.delete_file(stored.file_id).await?;
    let mut confirmed = deleted.confirmed_nodes.clone();
    confirmed.sort();
    let mut replicas = stored.replica_node_ids.clone();
    replicas.sort();
    assert_eq!(confirmed, replicas);
    assert!(cluster.holders(stored.file_id).is_empty());

    let err = cluster.coordinator.retrieve_file(stored.file_id).await.unwrap_err();
    assert_eq!(err, CoordError::NotFound(stored.file_id));
    assert_eq!(cluster.coordinator.file_name(stored.file_id), None);

    Ok(())
}

#[tokio::test]
async fn test_delete_of_unknown_file_is_not_found() -> anyhow::Result<()> {
    let cluster = TestCluster::new(2).await?;

    let err = cluster.coordinator.delete_file(999).await.unwrap_err();
    assert_eq!(err, CoordError::NotFound(999));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_succeeds_with_a_replica_down() -> anyhow::Result<()> {
    let cluster = TestCluster::with_config(3, full_replication(3)).await?;
    let stored = cluster.coordinator.store_file("partial.txt", payload(10, 1)).await?;

    let down = cluster.node("storage-node-2")?;
    down.kill();

    let deleted = cluster.coordinator.delete_file(stored.file_id).await?;
    assert_eq!(deleted.confirmed_nodes.len(), 2);
    assert!(!deleted.confirmed_nodes.contains(&"storage-node-2".to_string()));

    // the offline copy survives until someone cleans it up
    down.revive();
    assert_eq!(cluster.holders(stored.file_id), vec!["storage-node-2".to_string()]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_identical_replicas_verify_perfect() -> anyhow::Result<()> {
    let cluster = TestCluster::with_config(3, full_replication(3)).await?;
    let stored = cluster.coordinator.store_file("clean.bin", payload(2048, 5)).await?;

    let report = cluster.coordinator.verify_file_integrity(stored.file_id).await?;
    assert_eq!(report.file_name.as_deref(), Some("clean.bin"));
    assert_eq!(report.expected_checksum.as_deref(), Some(stored.checksum.as_str()));
    assert_eq!(report.total_nodes, 3);
    assert_eq!(report.valid_node_count, 3);
    assert_eq!(report.integrity_percentage, 100.0);
    assert_eq!(report.status, IntegrityStatus::Perfect);
    assert!(report.is_valid);
    assert!(!report.checksum_tie);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_corrupted_replica_of_three() -> anyhow::Result<()> {
    let cluster = TestCluster::with_config(3, full_replication(3)).await?;
    let stored = cluster.coordinator.store_file("rot.bin", payload(2048, 6)).await?;

    cluster
        .node("storage-node-2")?
        .corrupt(stored.file_id, b"flipped bits")
        .await?;

    let report = cluster.coordinator.verify_file_integrity(stored.file_id).await?;
    assert_eq!(report.expected_checksum.as_deref(), Some(stored.checksum.as_str()));
    assert_eq!(report.corrupted_nodes, vec!["storage-node-2".to_string()]);
    assert_eq!(report.valid_node_count, 2);
    assert!((report.integrity_percentage - 66.67).abs() < 0.01);
    assert_eq!(report.status, IntegrityStatus::Acceptable);
    assert!(!report.is_valid);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nodes_without_the_file_count_as_unavailable() -> anyhow::Result<()> {
    let cluster = TestCluster::with_config(4, full_replication(2)).await?;
    let stored = cluster.coordinator.store_file("half.bin", payload(64, 8)).await?;

    let report = cluster.coordinator.verify_file_integrity(stored.file_id).await?;
    assert_eq!(report.total_nodes, 4);
    assert_eq!(report.valid_node_count, 2);
    assert_eq!(report.unavailable_nodes.len(), 2);
    assert!(report.corrupted_nodes.is_empty());
    assert_eq!(report.integrity_percentage, 50.0);
    assert!(report.is_valid);

    // verification does not move the operation counters
    let stats = cluster.coordinator.get_system_statistics().await;
    assert_eq!(stats.total_operations, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_verify_unknown_file_is_emergency() -> anyhow::Result<()> {
    let cluster = TestCluster::new(2).await?;

    let report = cluster.coordinator.verify_file_integrity(31337).await?;
    assert_eq!(report.expected_checksum, None);
    assert_eq!(report.unavailable_nodes.len(), 2);
    assert_eq!(report.status, IntegrityStatus::Emergency);
    assert!(!report.is_valid);

    Ok(())
}
