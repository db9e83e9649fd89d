use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("Product not found: {0}")]
    NotFound(i64),

    #[error("User {0} already exists")]
    DuplicateUser(i64),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ProductResult<T> = Result<T, ProductError>;

/// JSON error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error identifier
    pub error: &'static str,
    /// Human-readable message
    pub message: String,
}

impl ProductError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ProductError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ProductError::DuplicateUser(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ProductError::Validation(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ProductError::Database(_) | ProductError::Cache(_) | ProductError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ProductError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_code();

        let message = if status.is_server_error() {
            tracing::error!(error_code = error, "Internal server error: {}", self);
            // Backend details stay in the logs
            "An internal error occurred".to_string()
        } else {
            tracing::info!(error_code = error, "{}", self);
            self.to_string()
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

impl From<DbErr> for ProductError {
    fn from(err: DbErr) -> Self {
        ProductError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for ProductError {
    fn from(err: redis::RedisError) -> Self {
        ProductError::Cache(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ProductError {
    fn from(err: validator::ValidationErrors) -> Self {
        ProductError::Validation(err.to_string())
    }
}

/// Map a user insert failure, recognizing primary key conflicts
pub(crate) fn user_insert_error(user_id: i64, err: DbErr) -> ProductError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ProductError::DuplicateUser(user_id),
        _ => err.into(),
    }
}
