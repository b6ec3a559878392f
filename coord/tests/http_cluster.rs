mod common;

use reqwest::{Client, StatusCode};
use std::time::Duration;

use ::common::checksum::sha256_hex;
use coord::core::coordinator::CoordinatorConfig;
use coord::core::integrity::IntegrityReport;
use coord::core::node::{NodeHealth, NodeStatus};
use coord::core::result::FileOperationResult;
use coord::core::stats::SystemStatistics;

use crate::common::{TestCoordinator, TestVolume, payload, wait_until};

async fn start_volumes(n: usize) -> anyhow::Result<Vec<TestVolume>> {
    let mut volumes = Vec::new();
    for i in 1..=n {
        volumes.push(TestVolume::new(&format!("storage-node-{i}"), &format!("StorageNode{i}")).await?);
    }
    Ok(volumes)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_store_retrieve_delete() -> anyhow::Result<()> {
    let volumes = start_volumes(3).await?;
    let coord = TestCoordinator::new(
        volumes.iter().map(|v| v.descriptor.clone()).collect(),
        CoordinatorConfig::default(),
    )
    .await?;
    let client = Client::new();
    let data = payload(10240, 3);

    let resp = client
        .put(format!("{}/files/quarterly%20report.pdf", coord.url()))
        .body(data.clone())
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let stored: FileOperationResult = resp.json().await?;
    assert!(stored.success);
    assert_eq!(stored.file_name.as_deref(), Some("quarterly report.pdf"));
    assert_eq!(stored.replicated_nodes.len(), 2);
    assert_eq!(stored.checksum.as_deref(), Some(sha256_hex(&data).as_str()));
    let file_id = stored.file_id.ok_or_else(|| anyhow::anyhow!("no file id"))?;

    let resp = client.get(format!("{}/files/{file_id}", coord.url())).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let served_by = resp.headers()["x-served-by"].to_str()?.to_string();
    assert!(stored.replicated_nodes.contains(&served_by));
    assert_eq!(resp.headers()["x-file-name"], "quarterly%20report%2Epdf");
    assert_eq!(
        resp.headers()["etag"].to_str()?.trim_matches('"'),
        sha256_hex(&data)
    );
    assert_eq!(resp.bytes().await?, data);

    let report: IntegrityReport = client
        .get(format!("{}/files/{file_id}/integrity", coord.url()))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(report.valid_node_count, 2);
    assert_eq!(report.unavailable_nodes.len(), 1);

    let resp = client.delete(format!("{}/files/{file_id}", coord.url())).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let deleted: FileOperationResult = resp.json().await?;
    assert_eq!(deleted.replicated_nodes.len(), 2);

    let resp = client.get(format!("{}/files/{file_id}", coord.url())).send().await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client.delete(format!("{}/files/{file_id}", coord.url())).send().await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let failed: FileOperationResult = resp.json().await?;
    assert!(!failed.success);
    assert_eq!(failed.error_kind.as_deref(), Some("NOT_FOUND"));

    coord.shutdown().await?;
    for v in volumes {
        v.shutdown().await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_error_statuses() -> anyhow::Result<()> {
    let volumes = start_volumes(1).await?;
    let coord = TestCoordinator::new(
        vec![volumes[0].descriptor.clone()],
        CoordinatorConfig::default(),
    )
    .await?;
    let client = Client::new();

    let resp = client.get(format!("{}/files/0", coord.url())).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client.get(format!("{}/files/not-a-number", coord.url())).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .put(format!("{}/files/empty.txt", coord.url()))
        .body(Vec::<u8>::new())
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let failed: FileOperationResult = resp.json().await?;
    assert_eq!(failed.error_kind.as_deref(), Some("VALIDATION"));

    volumes[0].kill(&client).await?;
    let resp = client
        .put(format!("{}/files/a.txt", coord.url()))
        .body("hello")
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    coord.shutdown().await?;
    for v in volumes {
        v.shutdown().await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_admin_views_track_a_killed_volume() -> anyhow::Result<()> {
    let volumes = start_volumes(3).await?;
    let coord = TestCoordinator::new(
        volumes.iter().map(|v| v.descriptor.clone()).collect(),
        CoordinatorConfig::default(),
    )
    .await?;
    let client = Client::new();

    let stats: SystemStatistics = client
        .get(format!("{}/admin/stats", coord.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(stats.active_nodes, 3);

    volumes[1].kill(&client).await?;

    let stats_url = format!("{}/admin/stats", coord.url());
    wait_until(5000, || {
        let (client, url) = (client.clone(), stats_url.clone());
        async move {
            let stats: SystemStatistics = client.get(url).send().await?.json().await?;
            anyhow::Ok(stats.active_nodes == 2)
        }
    })
    .await?;

    let nodes: Vec<NodeHealth> = client
        .get(format!("{}/admin/nodes", coord.url()))
        .send()
        .await?
        .json()
        .await?;
    let node2 = nodes
        .iter()
        .find(|n| n.node_id == "storage-node-2")
        .ok_or_else(|| anyhow::anyhow!("storage-node-2 missing"))?;
    assert_eq!(node2.status, NodeStatus::Unhealthy);

    client
        .put(format!("{}/files/x.txt", coord.url()))
        .body("x")
        .timeout(Duration::from_secs(10))
        .send()
        .await?
        .error_for_status()?;

    let resp = client
        .post(format!("{}/admin/stats/reset", coord.url()))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(coord.coordinator.get_system_statistics().await.total_operations, 0);

    coord.shutdown().await?;
    for v in volumes {
        v.shutdown().await?;
    }
    Ok(())
}
