//! Error taxonomy shared by every layer.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use super::types::{ErrorDetail, ErrorResponse};

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Ledger API error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Serialization(err.to_string())
            }
            _ => Self::Query(err.to_string()),
        }
    }
}

/// Failures talking to the ledger API
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API returned {status_code}: {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Failures delivering a webhook
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Endpoint rejected delivery with status {status_code}")]
    Rejected { status_code: u16 },

    #[error("Failed to serialize payload: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required variable {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("{0}")]
    Multiple(String),
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Database(DatabaseError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Database(DatabaseError::Connection(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "database_unavailable")
            }
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Self::Ledger(_) => (StatusCode::BAD_GATEWAY, "ledger_error"),
            Self::Webhook(_) => (StatusCode::BAD_GATEWAY, "webhook_error"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        if status.is_server_error() {
            tracing::error!(error_type = %error_type, message = %self, "Server error");
        }
        let body = ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
