//! The operation set every storage node exposes.
//!
//! The coordinator only ever talks to nodes through [`StorageNode`]; the HTTP
//! client in [`crate::node_client`] and the local store in `volume` are two
//! implementations of the same contract.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::url_utils::sanitize_url;

pub type FileId = i64;

/// Static configuration of one storage node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeDescriptor {
    pub node_id: String,
    pub address: String,      // e.g. http://127.0.0.1:3001
    pub service_name: String, // path prefix the node serves under
}

impl NodeDescriptor {
    pub fn new(
        node_id: impl Into<String>,
        address: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            address: address.into(),
            service_name: service_name.into(),
        }
    }

    pub fn base_url(&self) -> String {
        format!(
            "{}/{}",
            self.address.trim_end_matches('/'),
            self.service_name.trim_matches('/')
        )
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.node_id, self.base_url())
    }
}

/// Parses `<node_id>=<address>/<service_name>`,
/// e.g. `storage-node-1=http://127.0.0.1:3001/StorageNode1`.
impl FromStr for NodeDescriptor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node_id, rest) = s
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected <node_id>=<address>/<service>, got {s}"))?;
        let node_id = node_id.trim();
        if node_id.is_empty() {
            anyhow::bail!("empty node id in {s}");
        }

        let rest = rest.trim().trim_end_matches('/');
        let scheme_end = rest.find("://").map(|i| i + 3).unwrap_or(0);
        let (address, service_name) = match rest[scheme_end..].rsplit_once('/') {
            Some((host, service)) if !service.is_empty() => {
                (format!("{}{}", &rest[..scheme_end], host), service.to_string())
            }
            _ => anyhow::bail!("missing service name in {s}"),
        };

        Ok(Self {
            node_id: node_id.to_string(),
            address: sanitize_url(&address)?,
            service_name,
        })
    }
}

/// What a node reports about itself. Capacity figures come from the storage
/// medium, not from an accounting of stored files.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub node_id: String,
    pub total_capacity: u64,
    pub used_capacity: u64,
    pub available_capacity: u64,
    pub stored_files: u64,
    pub uptime_secs: u64,
}

impl NodeInfo {
    pub fn usage_percentage(&self) -> f64 {
        if self.total_capacity == 0 {
            return 0.0;
        }
        self.used_capacity as f64 / self.total_capacity as f64 * 100.0
    }
}

/// Error channel of the contract. Nothing else crosses the node boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("node unreachable: {0}")]
    Unreachable(String),
    #[error("file {0} not found")]
    NotFound(FileId),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl NodeError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, NodeError::Unreachable(_))
    }
}

impl From<std::io::Error> for NodeError {
    fn from(e: std::io::Error) -> Self {
        NodeError::Storage(e.to_string())
    }
}

#[async_trait]
pub trait StorageNode: Send + Sync {
    /// Writes `data` under `file_id`, replacing any previous content for that id.
    /// Returns an opaque reference to the stored location. The checksum is
    /// recorded as given, not checked against `data`.
    async fn store(
        &self,
        file_id: FileId,
        file_name: &str,
        data: Bytes,
        checksum: &str,
    ) -> Result<String, NodeError>;

    async fn retrieve(&self, file_id: FileId, local_ref: Option<&str>) -> Result<Bytes, NodeError>;

    /// `Ok(true)` only if something was removed.
    async fn delete(&self, file_id: FileId, local_ref: Option<&str>) -> Result<bool, NodeError>;

    /// Re-hashes the stored bytes and compares with `expected_checksum`.
    async fn verify(
        &self,
        file_id: FileId,
        local_ref: Option<&str>,
        expected_checksum: &str,
    ) -> Result<bool, NodeError>;

    async fn describe(&self) -> Result<NodeInfo, NodeError>;

    /// Must not touch slow I/O.
    async fn heartbeat(&self) -> Result<bool, NodeError>;

    async fn list_stored_ids(&self) -> Result<Vec<FileId>, NodeError>;
}
