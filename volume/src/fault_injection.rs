use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::time::sleep;

use common::api_error::ApiError;

use crate::state::VolumeState;

/// Switches used by cluster tests to simulate slow, stalled or dead nodes.
/// The admin routes that flip them are only mounted when the node is started
/// with fault injection enabled.
#[derive(Debug, Default)]
pub struct FaultInjector {
    pub latency_ms: AtomicU64,
    pub paused: AtomicBool,
    pub killed: AtomicBool,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub async fn apply_latency(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            sleep(Duration::from_millis(ms)).await;
        }
    }

    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_killed() {
            sleep(Duration::from_millis(50)).await;
        }
    }

    pub fn reset(&self) {
        self.latency_ms.store(0, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
        self.killed.store(false, Ordering::Relaxed);
    }
}

/// Runs in front of every contract route. A killed node answers 503, which
/// clients read as "unreachable".
pub async fn fault_gate(State(ctx): State<VolumeState>, request: Request, next: Next) -> Response {
    let faults = &ctx.fault_injector;
    if faults.is_killed() {
        return ApiError::Unavailable.into_response();
    }
    faults.wait_if_paused().await;
    faults.apply_latency().await;
    if faults.is_killed() {
        return ApiError::Unavailable.into_response();
    }

    next.run(request).await
}

#[derive(Deserialize)]
pub struct LatencyQuery {
    pub latency_ms: u64,
}

/// POST /admin/inject/latency?latency_ms=1000
pub async fn inject_latency(
    Query(params): Query<LatencyQuery>,
    State(ctx): State<VolumeState>,
) -> StatusCode {
    ctx.fault_injector
        .latency_ms
        .store(params.latency_ms, Ordering::Relaxed);
    StatusCode::OK
}

/// POST /admin/pause
pub async fn pause_server(State(ctx): State<VolumeState>) -> StatusCode {
    ctx.fault_injector.paused.store(true, Ordering::Relaxed);
    StatusCode::OK
}

/// POST /admin/resume
pub async fn resume_server(State(ctx): State<VolumeState>) -> StatusCode {
    ctx.fault_injector.paused.store(false, Ordering::Relaxed);
    StatusCode::OK
}

/// POST /admin/kill
pub async fn kill_server(State(ctx): State<VolumeState>) -> StatusCode {
    ctx.fault_injector.killed.store(true, Ordering::Relaxed);
    StatusCode::OK
}

/// POST /admin/reset
pub async fn reset_faults(State(ctx): State<VolumeState>) -> StatusCode {
    ctx.fault_injector.reset();
    StatusCode::OK
}
