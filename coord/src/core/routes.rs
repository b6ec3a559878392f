use anyhow::anyhow;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use common::api_error::ApiError;
use common::checksum::sha256_hex;
use common::constants::{FILE_NAME_HEADER, SERVED_BY_HEADER};
use common::node_api::FileId;

use crate::core::error::CoordError;
use crate::core::integrity::IntegrityReport;
use crate::core::node::NodeHealth;
use crate::core::result::FileOperationResult;
use crate::core::state::CoordinatorState;
use crate::core::stats::SystemStatistics;

pub fn build_router(state: CoordinatorState) -> Router {
    Router::new()
        .route(
            "/files/{file}",
            put(store_file).get(retrieve_file).delete(delete_file),
        )
        .route("/files/{file}/integrity", get(verify_file))
        .route("/admin/stats", get(system_stats))
        .route("/admin/stats/reset", post(reset_stats))
        .route("/admin/nodes", get(list_nodes))
        .layer(DefaultBodyLimit::max(state.max_size))
        .with_state(state)
}

/// Failures still carry the envelope; the status comes from the error taxonomy.
fn failure(err: CoordError) -> (StatusCode, Json<FileOperationResult>) {
    let body = FileOperationResult::failure(&err);
    (ApiError::from(err).status_code(), Json(body))
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| ApiError::Any(anyhow!("invalid header value: {}", e)))
}

// PUT /files/{file}
#[tracing::instrument(name = "coord.http.store", skip(ctx, body), fields(size = body.len()))]
pub async fn store_file(
    Path(file_name): Path<String>,
    State(ctx): State<CoordinatorState>,
    body: Bytes,
) -> (StatusCode, Json<FileOperationResult>) {
    match ctx.coordinator.store_file(&file_name, body).await {
        Ok(stored) => (StatusCode::CREATED, Json(FileOperationResult::from(&stored))),
        Err(e) => failure(e),
    }
}

// GET /files/{file}
#[tracing::instrument(name = "coord.http.retrieve", skip(ctx))]
pub async fn retrieve_file(
    Path(file_id): Path<FileId>,
    State(ctx): State<CoordinatorState>,
) -> Result<impl IntoResponse, ApiError> {
    let file = ctx.coordinator.retrieve_file(file_id).await?;

    let mut headers = HeaderMap::new();
    let encoded_name = utf8_percent_encode(&file.file_name, NON_ALPHANUMERIC).to_string();
    headers.insert(FILE_NAME_HEADER, header_value(&encoded_name)?);
    headers.insert(SERVED_BY_HEADER, header_value(&file.primary_node)?);
    headers.insert(
        "ETag",
        header_value(&format!("\"{}\"", sha256_hex(&file.data)))?,
    );

    Ok((StatusCode::OK, headers, file.data))
}

// DELETE /files/{file}
#[tracing::instrument(name = "coord.http.delete", skip(ctx))]
pub async fn delete_file(
    Path(file_id): Path<FileId>,
    State(ctx): State<CoordinatorState>,
) -> (StatusCode, Json<FileOperationResult>) {
    match ctx.coordinator.delete_file(file_id).await {
        Ok(deleted) => (StatusCode::OK, Json(FileOperationResult::from(&deleted))),
        Err(e) => failure(e),
    }
}

// GET /files/{file}/integrity
#[tracing::instrument(name = "coord.http.verify", skip(ctx))]
pub async fn verify_file(
    Path(file_id): Path<FileId>,
    State(ctx): State<CoordinatorState>,
) -> Result<Json<IntegrityReport>, ApiError> {
    let report = ctx.coordinator.verify_file_integrity(file_id).await?;
    Ok(Json(report))
}

// GET /admin/stats
pub async fn system_stats(State(ctx): State<CoordinatorState>) -> Json<SystemStatistics> {
    Json(ctx.coordinator.get_system_statistics().await)
}

// POST /admin/stats/reset
pub async fn reset_stats(State(ctx): State<CoordinatorState>) -> StatusCode {
    ctx.coordinator.reset_statistics();
    StatusCode::NO_CONTENT
}

// GET /admin/nodes
pub async fn list_nodes(State(ctx): State<CoordinatorState>) -> Json<Vec<NodeHealth>> {
    Json(ctx.coordinator.node_health())
}
