//! Connection registry: resolves configured nodes to live handles.
//!
//! Handles are created lazily, validated with a liveness probe before being
//! cached, and dropped again as soon as any call through them reports the node
//! unreachable. Retry policy belongs to callers.

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use common::node_api::{NodeDescriptor, NodeError, StorageNode};
use common::node_client::HttpNodeClient;

use crate::core::error::CoordError;
use crate::core::node::HealthMap;

pub type NodeHandle = Arc<dyn StorageNode>;

/// Opens a handle to a node's contract. One implementation per transport.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(&self, descriptor: &NodeDescriptor) -> Result<NodeHandle, NodeError>;
}

pub struct HttpConnector {
    http: Client,
}

impl HttpConnector {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl NodeConnector for HttpConnector {
    async fn connect(&self, descriptor: &NodeDescriptor) -> Result<NodeHandle, NodeError> {
        Ok(Arc::new(HttpNodeClient::new(self.http.clone(), descriptor)))
    }
}

#[derive(Clone)]
pub struct ConnectionRegistry {
    descriptors: Arc<Vec<NodeDescriptor>>,
    connector: Arc<dyn NodeConnector>,
    cache: Arc<RwLock<HashMap<String, NodeHandle>>>,
    health: HealthMap,
}

impl ConnectionRegistry {
    pub fn new(descriptors: Vec<NodeDescriptor>, connector: Arc<dyn NodeConnector>) -> Self {
        let health = HealthMap::new(descriptors.iter().map(|d| d.node_id.as_str()));
        Self {
            descriptors: Arc::new(descriptors),
            connector,
            cache: Arc::new(RwLock::new(HashMap::new())),
            health,
        }
    }

    pub fn descriptors(&self) -> &[NodeDescriptor] {
        &self.descriptors
    }

    pub fn health(&self) -> &HealthMap {
        &self.health
    }

    fn cached(&self, node_id: &str) -> Option<NodeHandle> {
        self.cache.read().ok()?.get(node_id).cloned()
    }

    pub fn evict(&self, node_id: &str) {
        if let Ok(mut cache) = self.cache.write()
            && cache.remove(node_id).is_some()
        {
            debug!(node_id, "evicted cached connection");
        }
    }

    /// Returns the cached handle, or connects and probes a new one.
    pub async fn get_connection(&self, node_id: &str) -> Result<NodeHandle, CoordError> {
        self.connection(node_id).await.map(|(handle, _)| handle)
    }

    /// The flag is true when the handle was freshly probed by this call.
    async fn connection(&self, node_id: &str) -> Result<(NodeHandle, bool), CoordError> {
        if let Some(handle) = self.cached(node_id) {
            return Ok((handle, false));
        }

        let descriptor = self
            .descriptors
            .iter()
            .find(|d| d.node_id == node_id)
            .ok_or_else(|| CoordError::UnknownNode(node_id.to_string()))?;

        let handle = match self.connector.connect(descriptor).await {
            Ok(handle) => handle,
            Err(e) => {
                self.health.mark_unhealthy(node_id, e.to_string());
                return Err(CoordError::NodeUnreachable(node_id.to_string()));
            }
        };

        match handle.heartbeat().await {
            Ok(true) => {
                if let Ok(mut cache) = self.cache.write() {
                    cache.insert(node_id.to_string(), handle.clone());
                }
                self.health.mark_healthy(node_id);
                Ok((handle, true))
            }
            Ok(false) => {
                self.evict(node_id);
                self.health.mark_unhealthy(node_id, "node reports not alive");
                Err(CoordError::NodeUnreachable(node_id.to_string()))
            }
            Err(e) => {
                self.evict(node_id);
                self.health.mark_unhealthy(node_id, e.to_string());
                Err(CoordError::NodeUnreachable(node_id.to_string()))
            }
        }
    }

    /// Connects if needed and probes liveness, updating the health map either way.
    pub async fn probe(&self, node_id: &str) -> Option<NodeHandle> {
        let (handle, fresh) = self.connection(node_id).await.ok()?;
        if fresh {
            return Some(handle);
        }

        match handle.heartbeat().await {
            Ok(true) => {
                self.health.mark_healthy(node_id);
                Some(handle)
            }
            Ok(false) => {
                self.evict(node_id);
                self.health.mark_unhealthy(node_id, "node reports not alive");
                None
            }
            Err(e) => {
                self.evict(node_id);
                self.health.mark_unhealthy(node_id, e.to_string());
                None
            }
        }
    }

    /// Nodes answering a liveness probe right now, in configured order.
    /// Probes run concurrently and are never cached across calls.
    pub async fn list_available_nodes(&self) -> Vec<(String, NodeHandle)> {
        let probes = self.descriptors.iter().map(|d| async move {
            self.probe(&d.node_id)
                .await
                .map(|handle| (d.node_id.clone(), handle))
        });

        let available: Vec<_> = join_all(probes).await.into_iter().flatten().collect();
        debug!(
            available = available.len(),
            configured = self.descriptors.len(),
            "probed nodes"
        );
        available
    }

    /// Inline downgrade after a failed call: unreachable nodes lose their
    /// cached handle and are marked unhealthy without waiting for the monitor.
    pub fn report_failure(&self, node_id: &str, err: &NodeError) {
        if err.is_unreachable() {
            warn!(node_id, "node call failed, downgrading: {err}");
            self.evict(node_id);
            self.health.mark_unhealthy(node_id, err.to_string());
        }
    }
}
