use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Domain errors raised by the user lifecycle and translated to the wire
/// format in exactly one place, the `IntoResponse` impl below.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{field} already exists")]
    DuplicateData { field: &'static str },

    #[error("user not found with {0}")]
    NotFound(String),

    #[error("{field} {constraint}")]
    Validation {
        field: &'static str,
        constraint: &'static str,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::DuplicateData { field } => (
                StatusCode::BAD_REQUEST,
                "DUPLICATE_DATA",
                format!("{field} already exists"),
            ),
            ApiError::NotFound(key) => (
                StatusCode::NOT_FOUND,
                "USER_NOT_FOUND",
                format!("user not found with {key}"),
            ),
            ApiError::Validation { field, constraint } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("{field} {constraint}"),
            ),
            // The cause is logged, never sent to the caller.
            ApiError::Database(e) => {
                tracing::error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "internal server error".to_string(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "code": code, "message": message }))).into_response()
    }
}
