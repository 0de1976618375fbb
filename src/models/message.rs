use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::task::TaskStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Success,
    Error,
}

/// Machine-readable reason attached to error envelopes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReason {
    BigFileSize,
    InvalidContent,
    UnknownModel,
    AlreadyProcessing,
    NotFound,
    Unauthorized,
    Internal,
}

/// Envelope shared by every JSON response of the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<ErrorReason>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Message {
    pub fn success(details: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: MessageKind::Success,
            details: Some(details.into()),
            reason: None,
            data,
        }
    }

    pub fn error(reason: ErrorReason, details: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            details: Some(details.into()),
            reason: Some(reason),
            data: serde_json::Value::Object(Default::default()),
        }
    }
}

/// Payload of an accepted submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitData {
    pub task_id: i64,
}

/// Response for the progress endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressResponse {
    pub status: TaskStatus,
    pub task_id: Option<i64>,
}

/// Public links for a task's blobs. Empty strings when the task is unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LinkResponse {
    pub source_link: String,
    pub output_link: String,
}

/// Credentials exchanged for an access token.
#[derive(Debug, Deserialize, Validate)]
pub struct TokenRequest {
    #[garde(length(min = 1, max = 128))]
    pub username: String,

    #[garde(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}
