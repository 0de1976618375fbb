use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::message::ProgressResponse;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
    pub progress: ProgressResponse,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub worker: ComponentHealth,
    pub storage: StorageMode,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct StorageMode {
    pub remote_configured: bool,
    pub local_root: String,
}

/// GET /health: health check with dependency status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let orchestrator = &state.orchestrator;
    let start = std::time::Instant::now();

    // Check database connectivity
    let db_check = match sqlx::query("SELECT 1")
        .execute(orchestrator.store().pool())
        .await
    {
        Ok(_) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    };

    let worker_check = ComponentHealth {
        status: if orchestrator.queue().is_open() { "ok" } else { "error" }.to_string(),
        latency_ms: None,
    };

    let all_healthy = db_check.status == "ok" && worker_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database: db_check,
            worker: worker_check,
            storage: StorageMode {
                remote_configured: orchestrator.storage().remote_configured(),
                local_root: orchestrator.storage().local().root().display().to_string(),
            },
        },
        progress: orchestrator.progress(),
    };

    (status_code, Json(response))
}
