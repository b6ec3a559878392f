//! HTTP transport adapter for the storage node contract (client side).

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::constants::REPLICATED_FROM_HEADER;
use crate::node_api::{FileId, NodeDescriptor, NodeError, NodeInfo, StorageNode};
use crate::schemas::{
    DeleteResponse, HeartbeatResponse, ListIdsResponse, StoreResponse, VerifyResponse,
};
use crate::trace_middleware::inject_trace_context;

#[derive(Clone, Debug)]
pub struct HttpNodeClient {
    http: Client,
    node_id: String,
    base_url: String,
    replicated_from: Option<String>,
}

impl HttpNodeClient {
    pub fn new(http: Client, descriptor: &NodeDescriptor) -> Self {
        Self {
            http,
            node_id: descriptor.node_id.clone(),
            base_url: descriptor.base_url(),
            replicated_from: None,
        }
    }

    /// Marks every write from this client as a peer replication from `origin`,
    /// so the receiving node does not propagate it again.
    pub fn replicated_from(mut self, origin: impl Into<String>) -> Self {
        self.replicated_from = Some(origin.into());
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn files_url(&self, file_id: FileId) -> String {
        format!("{}/files/{}", self.base_url, file_id)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, NodeError> {
        inject_trace_context(builder)
            .send()
            .await
            .map_err(|e| NodeError::Unreachable(format!("{}: {}", self.node_id, e)))
    }
}

/// Folds a node's HTTP status into the contract's error channel.
async fn check_status(resp: Response, file_id: Option<FileId>) -> Result<Response, NodeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => match file_id {
            Some(id) => NodeError::NotFound(id),
            None => NodeError::Storage(format!("{status}: {body}")),
        },
        StatusCode::BAD_REQUEST => NodeError::Invalid(body),
        StatusCode::SERVICE_UNAVAILABLE => NodeError::Unreachable(body),
        _ => NodeError::Storage(format!("{status}: {body}")),
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, NodeError> {
    resp.json::<T>()
        .await
        .map_err(|e| NodeError::Storage(format!("malformed response: {e}")))
}

fn with_local_ref(builder: RequestBuilder, local_ref: Option<&str>) -> RequestBuilder {
    match local_ref {
        Some(r) => builder.query(&[("local_ref", r)]),
        None => builder,
    }
}

#[async_trait]
impl StorageNode for HttpNodeClient {
    async fn store(
        &self,
        file_id: FileId,
        file_name: &str,
        data: Bytes,
        checksum: &str,
    ) -> Result<String, NodeError> {
        let mut req = self
            .http
            .put(self.files_url(file_id))
            .query(&[("file_name", file_name), ("checksum", checksum)])
            .body(data);
        if let Some(origin) = &self.replicated_from {
            req = req.header(REPLICATED_FROM_HEADER, origin);
        }

        let resp = check_status(self.send(req).await?, Some(file_id)).await?;
        let body: StoreResponse = decode(resp).await?;
        Ok(body.local_ref)
    }

    async fn retrieve(&self, file_id: FileId, local_ref: Option<&str>) -> Result<Bytes, NodeError> {
        let req = with_local_ref(self.http.get(self.files_url(file_id)), local_ref);
        let resp = check_status(self.send(req).await?, Some(file_id)).await?;
        resp.bytes()
            .await
            .map_err(|e| NodeError::Unreachable(format!("{}: {}", self.node_id, e)))
    }

    async fn delete(&self, file_id: FileId, local_ref: Option<&str>) -> Result<bool, NodeError> {
        let mut req = with_local_ref(self.http.delete(self.files_url(file_id)), local_ref);
        if let Some(origin) = &self.replicated_from {
            req = req.header(REPLICATED_FROM_HEADER, origin);
        }

        let resp = check_status(self.send(req).await?, Some(file_id)).await?;
        let body: DeleteResponse = decode(resp).await?;
        Ok(body.deleted)
    }

    async fn verify(
        &self,
        file_id: FileId,
        local_ref: Option<&str>,
        expected_checksum: &str,
    ) -> Result<bool, NodeError> {
        let url = format!("{}/verify", self.files_url(file_id));
        let req = with_local_ref(
            self.http
                .get(url)
                .query(&[("expected_checksum", expected_checksum)]),
            local_ref,
        );

        let resp = check_status(self.send(req).await?, Some(file_id)).await?;
        let body: VerifyResponse = decode(resp).await?;
        Ok(body.valid)
    }

    async fn describe(&self) -> Result<NodeInfo, NodeError> {
        let req = self.http.get(format!("{}/info", self.base_url));
        let resp = check_status(self.send(req).await?, None).await?;
        decode(resp).await
    }

    async fn heartbeat(&self) -> Result<bool, NodeError> {
        let req = self.http.get(format!("{}/heartbeat", self.base_url));
        let resp = check_status(self.send(req).await?, None).await?;
        let body: HeartbeatResponse = decode(resp).await?;
        Ok(body.alive)
    }

    async fn list_stored_ids(&self) -> Result<Vec<FileId>, NodeError> {
        let req = self.http.get(format!("{}/files", self.base_url));
        let resp = check_status(self.send(req).await?, None).await?;
        let body: ListIdsResponse = decode(resp).await?;
        Ok(body.file_ids)
    }
}
