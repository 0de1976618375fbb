use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::message::{TokenRequest, TokenResponse};
use crate::routes::error::ApiError;
use crate::services::validation::ValidationError;

/// Bearer-token guard. Carries the token subject, or `None` when
/// authentication is disabled.
pub struct Authorized(pub Option<String>);

impl FromRequestParts<AppState> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(auth) = state.auth.as_ref() else {
            return Ok(Authorized(None));
        };

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let subject = auth.verify(token.trim()).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        Ok(Authorized(Some(subject)))
    }
}

/// POST /api/v1/token: exchange operator credentials for a bearer token.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let auth = state
        .auth
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Authentication is disabled".to_string()))?;

    request
        .validate()
        .map_err(|report| ValidationError::Malformed(report.to_string()))?;

    let access_token = auth
        .login(&request.username, &request.password)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    tracing::info!(username = %request.username, "Issued access token");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
