//! HTTP handlers.
//!
//! Each handler reads a snapshot copy from `SnapshotStore` and returns
//! JSON, except `/metrics` which returns Prometheus text.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::ApiState;

/// Sync progress at or above which a node counts as synced.
pub const SYNCED_THRESHOLD: f64 = 99.9;

#[derive(Debug, Serialize)]
struct HealthyResponse {
    status: &'static str,
    timestamp: u64,
    uptime: u64,
    block_height: u64,
}

#[derive(Debug, Serialize)]
struct UnhealthyResponse {
    status: &'static str,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    node_id: String,
    healthy: bool,
    sync_status: &'static str,
    sync_progress: f64,
    block_height: u64,
    connections: u32,
    uptime: u64,
    last_update: u64,
    latency_ms: f64,
}

/// "synced" at or above [`SYNCED_THRESHOLD`], else "syncing".
pub fn sync_status(progress: f64) -> &'static str {
    if progress >= SYNCED_THRESHOLD {
        "synced"
    } else {
        "syncing"
    }
}

/// GET /
pub async fn welcome() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Cardano Node Monitor API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/api/v1/health",
            "metrics": "/api/v1/metrics",
            "status": "/api/v1/status",
            "prometheus_metrics": "/metrics",
        },
    }))
}

/// GET /api/v1/health
pub async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.store.read().await;

    if !snapshot.healthy {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(UnhealthyResponse {
                status: "unhealthy",
                timestamp: snapshot.updated_at,
            }),
        )
            .into_response();
    }

    Json(HealthyResponse {
        status: "healthy",
        timestamp: snapshot.updated_at,
        uptime: snapshot.uptime_secs,
        block_height: snapshot.block_height,
    })
    .into_response()
}

/// GET /api/v1/metrics
pub async fn get_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.store.read().await)
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.store.read().await;

    Json(StatusResponse {
        sync_status: sync_status(snapshot.sync_progress),
        healthy: snapshot.healthy,
        sync_progress: snapshot.sync_progress,
        block_height: snapshot.block_height,
        connections: snapshot.connections,
        uptime: snapshot.uptime_secs,
        last_update: snapshot.updated_at,
        latency_ms: snapshot.latency_ms,
        node_id: snapshot.node_id,
    })
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.exporter.render(),
    )
}
