//! tipwatch-api — HTTP surface for tipwatch.
//!
//! Read-only handlers over the collector's [`SnapshotStore`] and the
//! Prometheus exporter. Handlers never block the collector: each request
//! takes a copy of the current snapshot under the store's read lock.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Service banner and route list |
//! | GET | `/api/v1/health` | 200 when the last tip fetch succeeded, else 503 |
//! | GET | `/api/v1/metrics` | Raw snapshot |
//! | GET | `/api/v1/status` | Snapshot plus derived sync status |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tipwatch_metrics::{PrometheusSink, SnapshotStore};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: SnapshotStore,
    pub exporter: Arc<PrometheusSink>,
}

/// Build the complete router (JSON API + Prometheus endpoint).
pub fn build_router(store: SnapshotStore, exporter: Arc<PrometheusSink>) -> Router {
    let state = ApiState { store, exporter };

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::get_metrics))
        .route("/status", get(handlers::get_status));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/", get(handlers::welcome))
        .with_state(state)
}
