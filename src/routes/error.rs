use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::db::queries::StoreError;
use crate::models::message::{ErrorReason, Message};
use crate::services::orchestrator::SubmitError;
use crate::services::validation::ValidationError;

/// Error returned by route handlers, rendered as a JSON error envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    fn status_and_reason(&self) -> (StatusCode, ErrorReason) {
        match self {
            ApiError::Validation(e) => match e {
                ValidationError::TooLarge { .. } | ValidationError::BodyLimitExceeded => {
                    (StatusCode::NOT_ACCEPTABLE, ErrorReason::BigFileSize)
                }
                ValidationError::MissingContentType
                | ValidationError::UnsupportedContentType(_)
                | ValidationError::ContentMismatch(_) => {
                    (StatusCode::NOT_ACCEPTABLE, ErrorReason::InvalidContent)
                }
                ValidationError::UnknownModel(_) => (StatusCode::BAD_REQUEST, ErrorReason::UnknownModel),
                ValidationError::MissingFile | ValidationError::Malformed(_) => {
                    (StatusCode::BAD_REQUEST, ErrorReason::InvalidContent)
                }
            },
            ApiError::Submit(SubmitError::AlreadyProcessing) => {
                (StatusCode::CONFLICT, ErrorReason::AlreadyProcessing)
            }
            ApiError::Submit(_) | ApiError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorReason::Internal)
            }
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, ErrorReason::Unauthorized),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorReason::NotFound),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = self.status_and_reason();

        let details = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(Message::error(reason, details))).into_response()
    }
}
