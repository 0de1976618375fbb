//! Image restoration service
//!
//! Accepts restoration jobs one at a time, tracks them durably, and stores
//! inputs and outputs in remote object storage with automatic fallback to
//! local disk.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use app_state::AppState;

/// Multipart framing allowance on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the HTTP router. Local blobs are served under `static_prefix`.
pub fn build_router(
    state: AppState,
    prometheus: Arc<PrometheusHandle>,
    static_prefix: &str,
) -> Router {
    let body_limit = state.max_file_size + MULTIPART_OVERHEAD;
    let static_files = ServeDir::new(state.orchestrator.storage().local().root());

    Router::new()
        .route("/", get(routes::tasks::root))
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/clean", post(routes::clean::submit_clean))
        .route("/api/v1/progress", get(routes::tasks::get_progress))
        .route("/api/v1/tasks/{task_id}", get(routes::tasks::get_task))
        .route("/api/v1/tasks/{task_id}/link", get(routes::tasks::get_link))
        .route("/api/v1/token", post(routes::auth::issue_token))
        .with_state(state)
        .nest_service(static_prefix, static_files)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
