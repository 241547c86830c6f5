//! API error type
//!
//! Handlers return `Result<_, ApiError>`; the error renders as the usual
//! `ApiResponse` envelope with `success: false`.

use crate::access::AccessError;
use crate::lifecycle::LifecycleError;
use crate::models::ApiResponse;
use crate::validation::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Postgres SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many attempts. Please try again later.")]
    TooManyRequests,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Database(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            ApiError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(ValidationError::FileTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Access(AccessError::InvalidFilter(_)) => StatusCode::BAD_REQUEST,
            ApiError::Access(_) | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Lifecycle(LifecycleError::UnknownStatus(_)) => StatusCode::BAD_REQUEST,
            ApiError::Lifecycle(LifecycleError::NotVisible) | ApiError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Lifecycle(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message safe to show to the caller
    fn public_message(&self) -> String {
        match self {
            ApiError::Database(e) if is_unique_violation(e) => {
                "A record with the same unique value already exists".to_string()
            }
            ApiError::Database(sqlx::Error::RowNotFound) => "Not found".to_string(),
            ApiError::Database(_) => "Database error".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Database(e) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("Database error: {:?}", e);
            }
            ApiError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            ApiError::Unauthorized(msg) => tracing::debug!("Unauthorized: {}", msg),
            ApiError::Access(e) => tracing::warn!("Access denied: {}", e),
            _ => {}
        }

        (status, Json(ApiResponse::<()>::error(self.public_message()))).into_response()
    }
}
