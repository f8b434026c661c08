use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::middleware::rate_limit::RateTier;

/// Every way an authentication flow can fail.
///
/// Credential failures are deliberately coarse: unknown user and wrong password
/// render the same body. Only rate-limit failures carry machine-readable detail.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("No authentication token provided")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token type")]
    WrongTokenType,

    #[error("Rate limit exceeded for the {tier} window")]
    RateLimitExceeded {
        tier: RateTier,
        retry_after_seconds: u64,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::WrongTokenType => StatusCode::UNAUTHORIZED,
            AuthError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            AuthError::RateLimitExceeded {
                tier,
                retry_after_seconds,
            } => {
                let body = json!({
                    "error": "Too many requests",
                    "message": tier.user_message(),
                    "detail": format!("Rate limit exceeded. Retry after {retry_after_seconds} seconds."),
                    "retry_after_seconds": retry_after_seconds,
                });
                (
                    status,
                    [(header::RETRY_AFTER, retry_after_seconds.to_string())],
                    Json(body),
                )
                    .into_response()
            }
            AuthError::Internal(e) => {
                error!("Internal authentication error: {:#}", e);
                (status, Json(json!({ "detail": "Internal server error" }))).into_response()
            }
            other => (
                status,
                [(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
                Json(json!({ "detail": other.to_string() })),
            )
                .into_response(),
        }
    }
}
