use std::time::Duration;

use common::api_error::ApiError;
use common::node_api::FileId;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CoordError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("node {0} unreachable")]
    NodeUnreachable(String),
    #[error("unknown node {0}")]
    UnknownNode(String),
    #[error("no storage nodes available")]
    NoNodesAvailable,
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("file {0} not found on any node")]
    NotFound(FileId),
    #[error("store failed on all {0} selected nodes")]
    StoreFailed(usize),
    #[error("metadata store: {0}")]
    Metadata(String),
}

impl CoordError {
    /// Stable tag carried in result envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            CoordError::Validation(_) => "VALIDATION",
            CoordError::NodeUnreachable(_) => "NODE_UNREACHABLE",
            CoordError::UnknownNode(_) => "UNKNOWN_NODE",
            CoordError::NoNodesAvailable => "NO_NODES_AVAILABLE",
            CoordError::Timeout(_) => "TIMEOUT",
            CoordError::NotFound(_) => "NOT_FOUND",
            CoordError::StoreFailed(_) => "STORE_FAILED",
            CoordError::Metadata(_) => "METADATA",
        }
    }
}

impl From<CoordError> for ApiError {
    fn from(e: CoordError) -> Self {
        match e {
            CoordError::Validation(msg) => ApiError::BadRequest(msg),
            CoordError::NotFound(_) | CoordError::UnknownNode(_) => ApiError::NotFound(e.to_string()),
            CoordError::NoNodesAvailable => ApiError::NoNodesAvailable,
            CoordError::Timeout(_) => ApiError::Timeout,
            other => ApiError::Any(anyhow::anyhow!(other)),
        }
    }
}
