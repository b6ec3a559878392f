use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::HeaderMap,
    middleware,
    routing::{get, post},
};

use common::api_error::ApiError;
use common::constants::REPLICATED_FROM_HEADER;
use common::node_api::{FileId, NodeInfo, StorageNode};
use common::schemas::{
    DeleteResponse, HeartbeatResponse, ListIdsResponse, LocalRefQuery, StoreQuery, StoreResponse,
    VerifyQuery, VerifyResponse,
};
use common::trace_middleware::trace_context_middleware;

use crate::fault_injection::{
    fault_gate, inject_latency, kill_server, pause_server, reset_faults, resume_server,
};
use crate::replicate::{PropagationOp, PropagationRecord, PropagationStats};
use crate::state::VolumeState;

/// Contract routes nested under `/{service_name}`, plus the fault injection
/// admin routes when `with_faults` is set.
pub fn build_router(state: VolumeState, with_faults: bool) -> Router {
    let service = Router::new()
        .route("/files", get(list_handler))
        .route(
            "/files/{file_id}",
            get(retrieve_handler)
                .put(store_handler)
                .delete(delete_handler),
        )
        .route("/files/{file_id}/verify", get(verify_handler))
        .route("/info", get(info_handler))
        .route("/heartbeat", get(heartbeat_handler))
        .route("/replication", get(replication_handler))
        .layer(middleware::from_fn_with_state(state.clone(), fault_gate))
        .layer(DefaultBodyLimit::max(state.max_file_size));

    let mut app = Router::new().nest(&format!("/{}", state.service_name.trim_matches('/')), service);

    if with_faults {
        app = app
            .route("/admin/inject/latency", post(inject_latency))
            .route("/admin/pause", post(pause_server))
            .route("/admin/resume", post(resume_server))
            .route("/admin/kill", post(kill_server))
            .route("/admin/reset", post(reset_faults));
    }

    app.layer(middleware::from_fn(trace_context_middleware))
        .with_state(state)
}

fn is_replicated(headers: &HeaderMap) -> bool {
    headers.contains_key(REPLICATED_FROM_HEADER)
}

// PUT /{service}/files/{file_id}?file_name=&checksum=
#[tracing::instrument(name = "volume.store", skip(ctx, headers, body), fields(node_id = %ctx.node_id, size = body.len()))]
pub async fn store_handler(
    Path(file_id): Path<FileId>,
    Query(q): Query<StoreQuery>,
    State(ctx): State<VolumeState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StoreResponse>, ApiError> {
    let local_ref = ctx.store.store(file_id, &q.file_name, body, &q.checksum).await?;

    if !is_replicated(&headers)
        && let Some(p) = &ctx.propagation
    {
        p.enqueue(PropagationRecord::new(file_id, q.file_name, PropagationOp::Store));
    }

    Ok(Json(StoreResponse { local_ref }))
}

// GET /{service}/files/{file_id}?local_ref=
pub async fn retrieve_handler(
    Path(file_id): Path<FileId>,
    Query(q): Query<LocalRefQuery>,
    State(ctx): State<VolumeState>,
) -> Result<Bytes, ApiError> {
    Ok(ctx.store.retrieve(file_id, q.local_ref.as_deref()).await?)
}

// DELETE /{service}/files/{file_id}?local_ref=
#[tracing::instrument(name = "volume.delete", skip(ctx, headers, q), fields(node_id = %ctx.node_id))]
pub async fn delete_handler(
    Path(file_id): Path<FileId>,
    Query(q): Query<LocalRefQuery>,
    State(ctx): State<VolumeState>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, ApiError> {
    let file_name = ctx.store.meta(file_id).map(|m| m.file_name);
    let deleted = ctx.store.delete(file_id, q.local_ref.as_deref()).await?;

    if deleted
        && !is_replicated(&headers)
        && let Some(p) = &ctx.propagation
    {
        p.enqueue(PropagationRecord::new(
            file_id,
            file_name.unwrap_or_default(),
            PropagationOp::Delete,
        ));
    }

    Ok(Json(DeleteResponse { deleted }))
}

// GET /{service}/files/{file_id}/verify?expected_checksum=&local_ref=
pub async fn verify_handler(
    Path(file_id): Path<FileId>,
    Query(q): Query<VerifyQuery>,
    State(ctx): State<VolumeState>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let valid = ctx
        .store
        .verify(file_id, q.local_ref.as_deref(), &q.expected_checksum)
        .await?;
    Ok(Json(VerifyResponse { valid }))
}

// GET /{service}/info
pub async fn info_handler(State(ctx): State<VolumeState>) -> Result<Json<NodeInfo>, ApiError> {
    Ok(Json(ctx.store.describe().await?))
}

// GET /{service}/heartbeat
pub async fn heartbeat_handler(
    State(ctx): State<VolumeState>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let alive = ctx.store.heartbeat().await?;
    Ok(Json(HeartbeatResponse {
        alive,
        node_id: ctx.node_id.clone(),
    }))
}

// GET /{service}/files
pub async fn list_handler(State(ctx): State<VolumeState>) -> Result<Json<ListIdsResponse>, ApiError> {
    let file_ids = ctx.store.list_stored_ids().await?;
    Ok(Json(ListIdsResponse { file_ids }))
}

// GET /{service}/replication
pub async fn replication_handler(State(ctx): State<VolumeState>) -> Json<PropagationStats> {
    Json(
        ctx.propagation
            .as_ref()
            .map(|p| p.stats())
            .unwrap_or_default(),
    )
}
