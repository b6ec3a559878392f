use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use common::time_utils::utc_now_ms;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeHealth {
    pub node_id: String,
    pub status: NodeStatus,
    pub last_checked_ms: Option<i64>,
    pub last_error: Option<String>,
}

/// Per-node reachability flags. Written by the health monitor and by
/// coordinator operations that observe a failure; last write wins.
#[derive(Clone, Default)]
pub struct HealthMap {
    nodes: Arc<RwLock<HashMap<String, NodeHealth>>>,
}

impl HealthMap {
    pub fn new<'a>(node_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let nodes = node_ids
            .into_iter()
            .map(|id| {
                let health = NodeHealth {
                    node_id: id.to_string(),
                    status: NodeStatus::Unknown,
                    last_checked_ms: None,
                    last_error: None,
                };
                (id.to_string(), health)
            })
            .collect();
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    pub fn mark_healthy(&self, node_id: &str) {
        self.set(node_id, NodeStatus::Healthy, None);
    }

    pub fn mark_unhealthy(&self, node_id: &str, reason: impl Into<String>) {
        self.set(node_id, NodeStatus::Unhealthy, Some(reason.into()));
    }

    fn set(&self, node_id: &str, status: NodeStatus, error: Option<String>) {
        let mut nodes = match self.nodes.write() {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("failed to acquire health lock: {}", e);
                return;
            }
        };

        let entry = nodes
            .entry(node_id.to_string())
            .or_insert_with(|| NodeHealth {
                node_id: node_id.to_string(),
                status: NodeStatus::Unknown,
                last_checked_ms: None,
                last_error: None,
            });
        if entry.status != status {
            info!(node_id, from = ?entry.status, to = ?status, "node health changed");
        }
        entry.status = status;
        entry.last_checked_ms = Some(utc_now_ms());
        entry.last_error = error;
    }

    pub fn get(&self, node_id: &str) -> Option<NodeHealth> {
        self.nodes.read().ok()?.get(node_id).cloned()
    }

    /// Sorted by node id.
    pub fn snapshot(&self) -> Vec<NodeHealth> {
        let mut all: Vec<NodeHealth> = match self.nodes.read() {
            Ok(nodes) => nodes.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        all.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        all
    }
}
