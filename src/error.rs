use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error};

use crate::users::repo::StoreError;

/// Outcome kinds surfaced at the HTTP boundary. Messages are fixed strings;
/// nothing internal reaches the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("server error: {0:#}")]
    Server(anyhow::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::DuplicateEmail => {
                (StatusCode::CONFLICT, "duplicate_email", "User already exists".into())
            }
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid credentials".into(),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Token is not valid".into(),
            ),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "Access denied".into()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found", "User not found".into()),
            ApiError::Server(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Server error".into(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Server(e) = &self {
            error!(error = %format!("{e:#}"), "request failed");
        }
        let (status, code, msg) = self.parts();
        (
            status,
            Json(json!({
                "success": false,
                "error": code,
                "msg": msg,
            })),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => ApiError::DuplicateEmail,
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Backend(e) => ApiError::Server(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        debug!(error = %e.body_text(), "request body rejected");
        ApiError::Validation("Invalid request body".into())
    }
}
