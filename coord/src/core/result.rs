use serde::{Deserialize, Serialize};

use common::node_api::FileId;

use crate::core::coordinator::{DeletedFile, StoredFile};
use crate::core::error::CoordError;

/// Uniform envelope returned to front-end callers for file operations.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FileOperationResult {
    pub success: bool,
    pub message: String,
    pub file_id: Option<FileId>,
    pub file_name: Option<String>,
    pub checksum: Option<String>,
    pub size_bytes: Option<u64>,
    pub replicated_nodes: Vec<String>,
    pub primary_node: Option<String>,
    pub insufficient_replicas: bool,
    pub error_kind: Option<String>,
}

impl FileOperationResult {
    pub fn failure(err: &CoordError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error_kind: Some(err.kind().to_string()),
            ..Self::default()
        }
    }
}

impl From<&StoredFile> for FileOperationResult {
    fn from(f: &StoredFile) -> Self {
        let message = if f.insufficient_replicas {
            format!(
                "stored on {} of {} requested nodes (insufficient replicas)",
                f.replica_node_ids.len(),
                f.requested_replicas
            )
        } else {
            format!("stored on {} nodes", f.replica_node_ids.len())
        };

        Self {
            success: true,
            message,
            file_id: Some(f.file_id),
            file_name: Some(f.file_name.clone()),
            checksum: Some(f.checksum.clone()),
            size_bytes: Some(f.size_bytes),
            replicated_nodes: f.replica_node_ids.clone(),
            primary_node: Some(f.primary_node_id.clone()),
            insufficient_replicas: f.insufficient_replicas,
            error_kind: None,
        }
    }
}

impl From<&DeletedFile> for FileOperationResult {
    fn from(f: &DeletedFile) -> Self {
        Self {
            success: true,
            message: format!("deleted from {} nodes", f.confirmed_nodes.len()),
            file_id: Some(f.file_id),
            replicated_nodes: f.confirmed_nodes.clone(),
            ..Self::default()
        }
    }
}
