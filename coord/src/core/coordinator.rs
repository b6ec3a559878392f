//! Replication coordinator: fans file operations out to storage nodes and
//! folds per-node outcomes into one result under a deadline.

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use rand::Rng;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use common::checksum::sha256_hex;
use common::node_api::{FileId, NodeError, NodeInfo};
use common::time_utils::utc_now_ms;

use crate::core::error::CoordError;
use crate::core::integrity::{IntegrityReport, build_report};
use crate::core::metadata::{FileRecord, MetadataClient, MetadataOperation};
use crate::core::node::NodeHealth;
use crate::core::placement::{PlacementStrategy, RandomPlacement};
use crate::core::registry::{ConnectionRegistry, NodeHandle};
use crate::core::stats::{NodeState, NodeStatistics, OpCounters, SystemStatistics};

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub replication_factor: usize,
    pub store_timeout: Duration,
    pub delete_timeout: Duration,
    pub verify_timeout: Duration,
    pub stats_timeout: Duration,
    pub worker_pool_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            replication_factor: 2,
            store_timeout: Duration::from_secs(30),
            delete_timeout: Duration::from_secs(15),
            verify_timeout: Duration::from_secs(20),
            stats_timeout: Duration::from_secs(10),
            worker_pool_size: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredFile {
    pub file_id: FileId,
    pub file_name: String,
    pub size_bytes: u64,
    pub checksum: String,
    /// Nodes that confirmed the write, in confirmation order.
    pub replica_node_ids: Vec<String>,
    pub primary_node_id: String,
    pub requested_replicas: usize,
    pub insufficient_replicas: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetrievedFile {
    pub file_id: FileId,
    pub file_name: String,
    pub data: Bytes,
    pub primary_node: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeletedFile {
    pub file_id: FileId,
    pub confirmed_nodes: Vec<String>,
}

#[derive(Clone)]
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: ConnectionRegistry,
    placement: Arc<dyn PlacementStrategy>,
    pool: Arc<Semaphore>,
    counters: Arc<OpCounters>,
    file_names: Arc<RwLock<HashMap<FileId, String>>>,
    metadata: Option<Arc<dyn MetadataClient>>,
    last_file_id: Arc<AtomicI64>,
}

pub fn recovered_file_name(file_id: FileId) -> String {
    format!("recovered-file-{file_id}.dat")
}

fn validate_id(file_id: FileId) -> Result<(), CoordError> {
    if file_id <= 0 {
        return Err(CoordError::Validation(format!(
            "file id must be positive, got {file_id}"
        )));
    }
    Ok(())
}

fn validate_payload(file_name: &str, data: &[u8]) -> Result<(), CoordError> {
    if file_name.trim().is_empty() {
        return Err(CoordError::Validation("file name must not be blank".into()));
    }
    if data.is_empty() {
        return Err(CoordError::Validation("file data must not be empty".into()));
    }
    Ok(())
}

impl Coordinator {
    pub fn new(registry: ConnectionRegistry, config: CoordinatorConfig) -> Self {
        Self {
            pool: Arc::new(Semaphore::new(config.worker_pool_size.max(1))),
            config,
            registry,
            placement: Arc::new(RandomPlacement),
            counters: Arc::new(OpCounters::default()),
            file_names: Arc::new(RwLock::new(HashMap::new())),
            metadata: None,
            last_file_id: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn with_placement(mut self, placement: Arc<dyn PlacementStrategy>) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataClient>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn node_health(&self) -> Vec<NodeHealth> {
        self.registry.health().snapshot()
    }

    /// `now_ms * 1000 + random(0..1000)`, bumped so ids never repeat or go
    /// backwards within this process.
    pub fn next_file_id(&self) -> FileId {
        let candidate = utc_now_ms() * 1000 + rand::rng().random_range(0..1000);
        let prev = self
            .last_file_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(candidate.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        candidate.max(prev + 1)
    }

    pub fn file_name(&self, file_id: FileId) -> Option<String> {
        self.file_names.read().ok()?.get(&file_id).cloned()
    }

    /// Runs a node call inside the shared worker pool.
    fn spawn_node_call<T, F, Fut>(
        &self,
        node_id: String,
        handle: NodeHandle,
        call: F,
    ) -> JoinHandle<(String, Result<T, NodeError>)>
    where
        T: Send + 'static,
        F: FnOnce(NodeHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, NodeError>> + Send + 'static,
    {
        let pool = self.pool.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let res = match pool.acquire_owned().await {
                Ok(_permit) => call(handle).await,
                Err(e) => Err(NodeError::Storage(format!("worker pool closed: {e}"))),
            };
            if let Err(e) = &res {
                registry.report_failure(&node_id, e);
            }
            (node_id, res)
        })
    }

    #[tracing::instrument(name = "coord.store", skip(self, data), fields(file_name = %file_name, size = data.len()))]
    pub async fn store_file(&self, file_name: &str, data: Bytes) -> Result<StoredFile, CoordError> {
        validate_payload(file_name, &data)?;
        let file_id = self.next_file_id();
        let outcome = self.store_inner(file_id, file_name, data).await;
        self.counters.record(&outcome);
        outcome
    }

    /// Stores under a caller-chosen id, replacing whatever nodes hold for it.
    #[tracing::instrument(name = "coord.store_with_id", skip(self, data), fields(size = data.len()))]
    pub async fn store_file_with_id(
        &self,
        file_id: FileId,
        file_name: &str,
        data: Bytes,
    ) -> Result<StoredFile, CoordError> {
        validate_id(file_id)?;
        validate_payload(file_name, &data)?;
        let outcome = self.store_inner(file_id, file_name, data).await;
        self.counters.record(&outcome);
        outcome
    }

    async fn store_inner(
        &self,
        file_id: FileId,
        file_name: &str,
        data: Bytes,
    ) -> Result<StoredFile, CoordError> {
        let checksum = sha256_hex(&data);

        let available = self.registry.list_available_nodes().await;
        if available.is_empty() {
            return Err(CoordError::NoNodesAvailable);
        }

        let requested = self.config.replication_factor;
        let ids: Vec<String> = available.iter().map(|(id, _)| id.clone()).collect();
        let selected = self
            .placement
            .select(file_id, &ids, requested.min(available.len()));
        if selected.len() < requested {
            warn!(
                file_id,
                available = selected.len(),
                requested,
                "fewer healthy nodes than replication factor"
            );
        }

        let handles: HashMap<String, NodeHandle> = available.into_iter().collect();
        let mut pending: FuturesUnordered<_> = selected
            .iter()
            .filter_map(|id| handles.get(id).map(|h| (id.clone(), h.clone())))
            .map(|(id, handle)| {
                let (name, data, checksum) = (file_name.to_string(), data.clone(), checksum.clone());
                self.spawn_node_call(id, handle, move |node| async move {
                    node.store(file_id, &name, data, &checksum).await
                })
            })
            .collect();

        let collect = async {
            let mut confirmed = Vec::new();
            while let Some(joined) = pending.next().await {
                match joined {
                    Ok((node_id, Ok(local_ref))) => {
                        debug!(node_id = %node_id, local_ref = %local_ref, "replica stored");
                        confirmed.push(node_id);
                    }
                    Ok((node_id, Err(e))) => warn!(node_id = %node_id, "store failed: {e}"),
                    Err(e) => warn!("store task failed: {e}"),
                }
            }
            confirmed
        };

        // on expiry the spawned calls are abandoned, not cancelled
        let confirmed = timeout(self.config.store_timeout, collect)
            .await
            .map_err(|_| CoordError::Timeout(self.config.store_timeout))?;

        let Some(primary) = confirmed.first().cloned() else {
            return Err(CoordError::StoreFailed(selected.len()));
        };

        if let Ok(mut names) = self.file_names.write() {
            names.insert(file_id, file_name.to_string());
        }

        let stored = StoredFile {
            file_id,
            file_name: file_name.to_string(),
            size_bytes: data.len() as u64,
            checksum,
            insufficient_replicas: confirmed.len() < requested,
            replica_node_ids: confirmed,
            primary_node_id: primary,
            requested_replicas: requested,
        };

        self.notify_metadata(
            MetadataOperation::CreateFile,
            json!(FileRecord {
                file_id,
                file_name: stored.file_name.clone(),
                size_bytes: stored.size_bytes,
                checksum: stored.checksum.clone(),
                replica_nodes: stored.replica_node_ids.clone(),
                primary_node: stored.primary_node_id.clone(),
            }),
        )
        .await;

        info!(
            file_id,
            replicas = ?stored.replica_node_ids,
            primary = %stored.primary_node_id,
            "file stored"
        );
        Ok(stored)
    }

    /// Tries available nodes one at a time and returns the first non-empty copy.
    #[tracing::instrument(name = "coord.retrieve", skip(self))]
    pub async fn retrieve_file(&self, file_id: FileId) -> Result<RetrievedFile, CoordError> {
        validate_id(file_id)?;
        let outcome = self.retrieve_inner(file_id).await;
        self.counters.record(&outcome);
        outcome
    }

    async fn retrieve_inner(&self, file_id: FileId) -> Result<RetrievedFile, CoordError> {
        let available = self.registry.list_available_nodes().await;
        if available.is_empty() {
            return Err(CoordError::NoNodesAvailable);
        }

        for (node_id, node) in available {
            let res = match self.pool.acquire().await {
                Ok(_permit) => node.retrieve(file_id, None).await,
                Err(e) => Err(NodeError::Storage(format!("worker pool closed: {e}"))),
            };

            match res {
                Ok(data) if !data.is_empty() => {
                    let file_name = self
                        .file_name(file_id)
                        .unwrap_or_else(|| recovered_file_name(file_id));
                    info!(file_id, node_id = %node_id, size = data.len(), "file retrieved");
                    return Ok(RetrievedFile {
                        file_id,
                        file_name,
                        data,
                        primary_node: node_id,
                    });
                }
                Ok(_) => debug!(node_id = %node_id, "node returned empty data"),
                Err(NodeError::NotFound(_)) => debug!(node_id = %node_id, "file not on node"),
                Err(e) => {
                    warn!(node_id = %node_id, "retrieve failed: {e}");
                    self.registry.report_failure(&node_id, &e);
                }
            }
        }

        Err(CoordError::NotFound(file_id))
    }

    /// Asks every available node to delete, not only the replicas chosen at store time.
    #[tracing::instrument(name = "coord.delete", skip(self))]
    pub async fn delete_file(&self, file_id: FileId) -> Result<DeletedFile, CoordError> {
        validate_id(file_id)?;
        let outcome = self.delete_inner(file_id).await;
        self.counters.record(&outcome);
        outcome
    }

    async fn delete_inner(&self, file_id: FileId) -> Result<DeletedFile, CoordError> {
        let available = self.registry.list_available_nodes().await;
        if available.is_empty() {
            return Err(CoordError::NoNodesAvailable);
        }

        let mut pending: FuturesUnordered<_> = available
            .into_iter()
            .map(|(id, handle)| {
                self.spawn_node_call(id, handle, move |node| async move {
                    node.delete(file_id, None).await
                })
            })
            .collect();

        let collect = async {
            let mut confirmed = Vec::new();
            while let Some(joined) = pending.next().await {
                match joined {
                    Ok((node_id, Ok(true))) => confirmed.push(node_id),
                    Ok((node_id, Ok(false))) => debug!(node_id = %node_id, "nothing to delete"),
                    Ok((node_id, Err(e))) => warn!(node_id = %node_id, "delete failed: {e}"),
                    Err(e) => warn!("delete task failed: {e}"),
                }
            }
            confirmed
        };

        let confirmed = timeout(self.config.delete_timeout, collect)
            .await
            .map_err(|_| CoordError::Timeout(self.config.delete_timeout))?;

        if confirmed.is_empty() {
            return Err(CoordError::NotFound(file_id));
        }

        if let Ok(mut names) = self.file_names.write() {
            names.remove(&file_id);
        }
        self.notify_metadata(MetadataOperation::DeleteFile, json!({ "file_id": file_id }))
            .await;

        info!(file_id, confirmed = ?confirmed, "file deleted");
        Ok(DeletedFile {
            file_id,
            confirmed_nodes: confirmed,
        })
    }

    /// Re-hashes every available copy and votes on the expected checksum.
    /// Not counted in the operation statistics.
    #[tracing::instrument(name = "coord.verify", skip(self))]
    pub async fn verify_file_integrity(&self, file_id: FileId) -> Result<IntegrityReport, CoordError> {
        validate_id(file_id)?;

        let available = self.registry.list_available_nodes().await;
        if available.is_empty() {
            return Err(CoordError::NoNodesAvailable);
        }
        let order: Vec<String> = available.iter().map(|(id, _)| id.clone()).collect();

        let mut pending: FuturesUnordered<_> = available
            .into_iter()
            .map(|(id, handle)| {
                self.spawn_node_call(id, handle, move |node| async move {
                    let data = node.retrieve(file_id, None).await?;
                    Ok::<_, NodeError>((!data.is_empty()).then(|| sha256_hex(&data)))
                })
            })
            .collect();

        let deadline = Instant::now() + self.config.verify_timeout;
        let mut observed: HashMap<String, Option<String>> = HashMap::new();
        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some(Ok((node_id, Ok(checksum))))) => {
                    observed.insert(node_id, checksum);
                }
                Ok(Some(Ok((node_id, Err(e))))) => {
                    debug!(node_id = %node_id, "no copy for verification: {e}");
                }
                Ok(Some(Err(e))) => warn!("verify task failed: {e}"),
                Ok(None) => break,
                Err(_) => {
                    warn!(file_id, stragglers = pending.len(), "verification deadline passed");
                    break;
                }
            }
        }

        let observations = order
            .into_iter()
            .map(|id| {
                let checksum = observed.remove(&id).flatten();
                (id, checksum)
            })
            .collect();
        let report = build_report(file_id, self.file_name(file_id), observations);

        info!(
            file_id,
            integrity = report.integrity_percentage,
            status = ?report.status,
            corrupted = ?report.corrupted_nodes,
            "integrity verified"
        );
        Ok(report)
    }

    /// Capacity of every configured node plus the running operation counters.
    /// Nodes failing the probe are OFFLINE; nodes failing `describe` are ERROR.
    #[tracing::instrument(name = "coord.stats", skip(self))]
    pub async fn get_system_statistics(&self) -> SystemStatistics {
        let available: HashMap<String, NodeHandle> =
            self.registry.list_available_nodes().await.into_iter().collect();

        let mut pending: FuturesUnordered<_> = available
            .iter()
            .map(|(id, handle)| {
                self.spawn_node_call(id.clone(), handle.clone(), |node| async move {
                    node.describe().await
                })
            })
            .collect();

        let deadline = Instant::now() + self.config.stats_timeout;
        let mut infos: HashMap<String, NodeInfo> = HashMap::new();
        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some(Ok((node_id, Ok(info))))) => {
                    infos.insert(node_id, info);
                }
                Ok(Some(Ok((node_id, Err(e))))) => warn!(node_id = %node_id, "describe failed: {e}"),
                Ok(Some(Err(e))) => warn!("describe task failed: {e}"),
                Ok(None) => break,
                Err(_) => {
                    warn!(stragglers = pending.len(), "statistics deadline passed");
                    break;
                }
            }
        }

        let health = self.registry.health();
        let nodes = self
            .registry
            .descriptors()
            .iter()
            .map(|d| {
                let last_checked = health.get(&d.node_id).and_then(|h| h.last_checked_ms);
                match infos.get(&d.node_id) {
                    Some(info) => NodeStatistics::active(info, last_checked),
                    None if available.contains_key(&d.node_id) => {
                        NodeStatistics::unavailable(&d.node_id, NodeState::Error, last_checked)
                    }
                    None => NodeStatistics::unavailable(&d.node_id, NodeState::Offline, last_checked),
                }
            })
            .collect();

        SystemStatistics::aggregate(nodes, self.counters.snapshot(), utc_now_ms())
    }

    pub fn reset_statistics(&self) {
        self.counters.reset();
        info!("operation statistics reset");
    }

    /// Best-effort: a failing metadata store never changes an operation's outcome.
    async fn notify_metadata(&self, operation: MetadataOperation, payload: serde_json::Value) {
        let Some(client) = &self.metadata else {
            return;
        };
        if let Err(e) = client.call(operation, payload).await {
            warn!(?operation, "metadata store update failed: {e}");
        }
    }
}
