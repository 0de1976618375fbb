use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::models::message::{Message, SubmitData};
use crate::models::restoration::RestorationModel;
use crate::routes::auth::Authorized;
use crate::routes::error::ApiError;
use crate::services::orchestrator::Submission;
use crate::services::validation::{validate_upload, ValidationError};

#[derive(Debug, Deserialize)]
pub struct CleanParams {
    pub model: Option<String>,
}

struct UploadedFile {
    filename: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// POST /api/v1/clean?model=<derain|defocus|deblur>: submit an image for restoration.
///
/// Responds 202 once the job is scheduled; poll the progress endpoint for the outcome.
pub async fn submit_clean(
    State(state): State<AppState>,
    Authorized(user): Authorized,
    Query(params): Query<CleanParams>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let model_name = params.model.unwrap_or_default();
    let model: RestorationModel = model_name
        .parse()
        .map_err(|_| ValidationError::UnknownModel(model_name.clone()))?;

    let file = read_file_field(multipart).await?;
    let upload = validate_upload(&file.data, file.content_type.as_deref(), state.max_file_size)?;

    let handle = state
        .orchestrator
        .submit(Submission {
            data: &file.data,
            extension: &upload.extension,
            filename: file.filename.as_deref(),
            model,
        })
        .await?;

    tracing::info!(
        task_id = handle.task_id,
        user = user.as_deref().unwrap_or("anonymous"),
        size = file.data.len(),
        "Accepted restoration request"
    );

    let data = serde_json::to_value(SubmitData {
        task_id: handle.task_id,
    })
    .unwrap_or_default();
    Ok((StatusCode::ACCEPTED, Json(Message::success("Task Scheduled", data))))
}

async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, ValidationError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;

        return Ok(UploadedFile {
            filename,
            content_type,
            data: data.to_vec(),
        });
    }

    Err(ValidationError::MissingFile)
}

fn multipart_error(e: MultipartError) -> ValidationError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationError::BodyLimitExceeded
    } else {
        ValidationError::Malformed(e.body_text())
    }
}
