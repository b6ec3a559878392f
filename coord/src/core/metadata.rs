//! Client side of the external metadata store's request/response protocol.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::node_api::FileId;

use crate::core::error::CoordError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataOperation {
    CreateFile,
    GetFileByName,
    UpdateFileReplicas,
    GetFileReplicas,
    DeleteFile,
    Query,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetadataRequest {
    pub operation: MetadataOperation,
    pub payload: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetadataResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Payload of CREATE_FILE and UPDATE_FILE_REPLICAS.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub file_id: FileId,
    pub file_name: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub replica_nodes: Vec<String>,
    pub primary_node: String,
}

#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn send(&self, request: MetadataRequest) -> Result<MetadataResponse, CoordError>;

    /// Sends `operation` and unwraps the response's data, turning an
    /// unsuccessful response into an error.
    async fn call(
        &self,
        operation: MetadataOperation,
        payload: Value,
    ) -> Result<Option<Value>, CoordError> {
        let resp = self.send(MetadataRequest { operation, payload }).await?;
        if resp.success {
            Ok(resp.data)
        } else {
            Err(CoordError::Metadata(
                resp.error_message
                    .unwrap_or_else(|| format!("{operation:?} rejected")),
            ))
        }
    }
}

/// JSON over HTTP: every request is a POST of [`MetadataRequest`] to one URL.
pub struct HttpMetadataClient {
    http: Client,
    url: String,
}

impl HttpMetadataClient {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
    async fn send(&self, request: MetadataRequest) -> Result<MetadataResponse, CoordError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CoordError::Metadata(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CoordError::Metadata(format!(
                "{:?} returned {}",
                request.operation,
                resp.status()
            )));
        }

        resp.json::<MetadataResponse>()
            .await
            .map_err(|e| CoordError::Metadata(format!("malformed response: {e}")))
    }
}
