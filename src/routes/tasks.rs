use axum::extract::{Path, State};
use axum::Json;

use crate::app_state::AppState;
use crate::models::message::{LinkResponse, Message, ProgressResponse};
use crate::models::task::Task;
use crate::routes::error::ApiError;

/// GET /: liveness banner.
pub async fn root() -> Json<Message> {
    Json(Message::success("running", serde_json::json!({})))
}

/// GET /api/v1/progress: what the service is doing right now.
pub async fn get_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    Json(state.orchestrator.progress())
}

/// GET /api/v1/tasks/{task_id}: full task record.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    state
        .orchestrator
        .store()
        .get(task_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Task {task_id} not found")))
}

/// GET /api/v1/tasks/{task_id}/link: public links to source and output.
pub async fn get_link(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<LinkResponse>, ApiError> {
    Ok(Json(state.orchestrator.links(task_id).await?))
}
