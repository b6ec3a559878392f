#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use axum_server::Server;
use bytes::Bytes;
use reqwest::Client;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::file_utils::data_path;
use common::node_api::{FileId, NodeDescriptor, NodeError, NodeInfo, StorageNode};
use coord::core::coordinator::{Coordinator, CoordinatorConfig};
use coord::core::registry::{ConnectionRegistry, HttpConnector, NodeConnector, NodeHandle};
use coord::core::routes::build_router as coord_router;
use coord::core::state::CoordinatorState;
use volume::routes::build_router as volume_router;
use volume::state::VolumeState;
use volume::store::LocalStore;

/// A local store behind switches that simulate a crashed or slow node.
pub struct FlakyNode {
    pub store: Arc<LocalStore>,
    pub down: AtomicBool,
    pub latency_ms: AtomicU64,
    pub calls: AtomicU64,
}

impl FlakyNode {
    pub fn kill(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    pub fn revive(&self) {
        self.down.store(false, Ordering::SeqCst);
    }

    /// Only data calls are delayed; liveness probes answer immediately.
    pub fn set_latency(&self, ms: u64) {
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    pub fn holds(&self, file_id: FileId) -> bool {
        self.store.meta(file_id).is_some()
    }

    /// Overwrites the blob on disk behind the store's back.
    pub async fn corrupt(&self, file_id: FileId, bytes: &[u8]) -> Result<()> {
        let meta = self
            .store
            .meta(file_id)
            .ok_or_else(|| anyhow::anyhow!("file {file_id} not on {}", self.store.node_id()))?;
        tokio::fs::write(data_path(self.store.root(), &meta.blob), bytes).await?;
        Ok(())
    }

    async fn gate(&self) -> Result<(), NodeError> {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.check_up()
    }

    fn check_up(&self) -> Result<(), NodeError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(NodeError::Unreachable(self.store.node_id().to_string()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StorageNode for FlakyNode {
    async fn store(
        &self,
        file_id: FileId,
        file_name: &str,
        data: Bytes,
        checksum: &str,
    ) -> Result<String, NodeError> {
        self.gate().await?;
        self.store.store(file_id, file_name, data, checksum).await
    }

    async fn retrieve(&self, file_id: FileId, local_ref: Option<&str>) -> Result<Bytes, NodeError> {
        self.gate().await?;
        self.store.retrieve(file_id, local_ref).await
    }

    async fn delete(&self, file_id: FileId, local_ref: Option<&str>) -> Result<bool, NodeError> {
        self.gate().await?;
        self.store.delete(file_id, local_ref).await
    }

    async fn verify(
        &self,
        file_id: FileId,
        local_ref: Option<&str>,
        expected_checksum: &str,
    ) -> Result<bool, NodeError> {
        self.gate().await?;
        self.store.verify(file_id, local_ref, expected_checksum).await
    }

    async fn describe(&self) -> Result<NodeInfo, NodeError> {
        self.gate().await?;
        self.store.describe().await
    }

    async fn heartbeat(&self) -> Result<bool, NodeError> {
        self.check_up()?;
        self.store.heartbeat().await
    }

    async fn list_stored_ids(&self) -> Result<Vec<FileId>, NodeError> {
        self.gate().await?;
        self.store.list_stored_ids().await
    }
}

pub struct InProcessConnector {
    nodes: HashMap<String, Arc<FlakyNode>>,
}

#[async_trait]
impl NodeConnector for InProcessConnector {
    async fn connect(&self, descriptor: &NodeDescriptor) -> Result<NodeHandle, NodeError> {
        self.nodes
            .get(&descriptor.node_id)
            .map(|n| n.clone() as NodeHandle)
            .ok_or_else(|| NodeError::Unreachable(descriptor.node_id.clone()))
    }
}

/// Coordinator wired straight to in-process nodes, no HTTP in between.
pub struct TestCluster {
    pub coordinator: Coordinator,
    pub nodes: Vec<Arc<FlakyNode>>,
    pub dirs: Vec<TempDir>,
}

impl TestCluster {
    pub async fn new(n_nodes: usize) -> Result<Self> {
        Self::with_config(n_nodes, CoordinatorConfig::default()).await
    }

    pub async fn with_config(n_nodes: usize, config: CoordinatorConfig) -> Result<Self> {
        let mut dirs = Vec::new();
        let mut nodes = Vec::new();
        let mut descriptors = Vec::new();

        for i in 1..=n_nodes {
            let dir = TempDir::new()?;
            let node_id = format!("storage-node-{i}");
            let store = Arc::new(LocalStore::open(dir.path(), &node_id).await?);
            nodes.push(Arc::new(FlakyNode {
                store,
                down: AtomicBool::new(false),
                latency_ms: AtomicU64::new(0),
                calls: AtomicU64::new(0),
            }));
            descriptors.push(NodeDescriptor::new(
                node_id,
                "http://in-process",
                format!("StorageNode{i}"),
            ));
            dirs.push(dir);
        }

        let connector = InProcessConnector {
            nodes: nodes
                .iter()
                .map(|n| (n.store.node_id().to_string(), n.clone()))
                .collect(),
        };
        let registry = ConnectionRegistry::new(descriptors, Arc::new(connector));

        Ok(Self {
            coordinator: Coordinator::new(registry, config),
            nodes,
            dirs,
        })
    }

    pub fn node(&self, node_id: &str) -> Result<&Arc<FlakyNode>> {
        self.nodes
            .iter()
            .find(|n| n.store.node_id() == node_id)
            .ok_or_else(|| anyhow::anyhow!("no node {node_id}"))
    }

    pub fn holders(&self, file_id: FileId) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.holds(file_id))
            .map(|n| n.store.node_id().to_string())
            .collect()
    }
}

pub struct TestServer {
    pub handle: JoinHandle<Result<(), anyhow::Error>>,
    pub shutdown_tx: watch::Sender<bool>,
    pub addr: SocketAddr,
    pub url: String,
}

impl TestServer {
    pub async fn spawn(app: Router) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let url = format!("http://{}", addr);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let server = Server::from_tcp(listener.into_std()?).serve(app.into_make_service());

            tokio::select! {
                res = server => res.map_err(anyhow::Error::from),
                _ = shutdown_rx.changed() => Ok(()),
            }
        });

        Ok(TestServer {
            handle,
            shutdown_tx,
            addr,
            url,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
        let _ = self.handle.await;
        Ok(())
    }
}

/// A real volume server with fault injection routes mounted.
pub struct TestVolume {
    pub server: TestServer,
    pub state: VolumeState,
    pub data_dir: TempDir,
    pub descriptor: NodeDescriptor,
}

impl TestVolume {
    pub async fn new(node_id: &str, service_name: &str) -> Result<Self> {
        let data_dir = TempDir::new()?;
        let store = Arc::new(LocalStore::open(data_dir.path(), node_id).await?);
        let state = VolumeState::new(store, service_name);

        let server = TestServer::spawn(volume_router(state.clone(), true)).await?;
        let descriptor = NodeDescriptor::new(node_id, server.url.clone(), service_name);

        Ok(TestVolume {
            server,
            state,
            data_dir,
            descriptor,
        })
    }

    pub async fn kill(&self, client: &Client) -> Result<()> {
        client
            .post(format!("{}/admin/kill", self.url()))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub fn url(&self) -> &str {
        &self.server.url
    }

    pub async fn shutdown(self) -> Result<()> {
        self.server.shutdown().await
    }
}

pub struct TestCoordinator {
    pub server: TestServer,
    pub coordinator: Coordinator,
}

impl TestCoordinator {
    pub async fn new(descriptors: Vec<NodeDescriptor>, config: CoordinatorConfig) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        let registry = ConnectionRegistry::new(descriptors, Arc::new(HttpConnector::new(http)));
        let coordinator = Coordinator::new(registry, config);

        let state = CoordinatorState {
            coordinator: coordinator.clone(),
            max_size: 1024 * 1024,
        };
        let server = TestServer::spawn(coord_router(state)).await?;

        Ok(TestCoordinator {
            server,
            coordinator,
        })
    }

    pub fn url(&self) -> &str {
        &self.server.url
    }

    pub async fn shutdown(self) -> Result<()> {
        self.server.shutdown().await
    }
}

pub fn payload(len: usize, seed: u8) -> Bytes {
    Bytes::from((0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect::<Vec<_>>())
}

pub async fn wait_until<F, Fut>(timeout_ms: u64, mut check_fn: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let timeout_duration = Duration::from_millis(timeout_ms);

    loop {
        if check_fn().await? {
            return Ok(());
        }

        if start.elapsed() > timeout_duration {
            anyhow::bail!("wait_until timed out after {}ms", timeout_ms);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
