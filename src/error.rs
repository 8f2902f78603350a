// ABOUTME: Centralized error handling for every route with JSON error bodies
// ABOUTME: Logs internal details server-side and exposes only a short message to clients

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde_json::json;
use thiserror::Error;

use crate::payments::PaymentError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Payment processor error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Database(_) | AppError::Payment(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {msg}");
                msg.clone()
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {msg}");
                msg.clone()
            }
            AppError::NotFound(msg) => {
                tracing::info!("Resource not found: {msg}");
                msg.clone()
            }
            AppError::Conflict(msg) => {
                tracing::info!("Conflict: {msg}");
                msg.clone()
            }
            AppError::PayloadTooLarge(msg) => {
                tracing::warn!("Payload too large: {msg}");
                msg.clone()
            }
            AppError::Database(_) => {
                tracing::error!("{self}");
                "Database operation failed".to_string()
            }
            AppError::Payment(_) => {
                tracing::error!("{self}");
                "Payment processor request failed".to_string()
            }
            AppError::Internal(_) => {
                tracing::error!("{self}");
                "Internal server error".to_string()
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(err.body_text())
        } else {
            AppError::BadRequest(err.body_text())
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O failure: {err}"))
    }
}

/// True when the database rejected a write because of a unique index.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// True when the database rejected a write because of a foreign key.
pub fn is_foreign_key_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::ForeignKeyConstraintViolation(_)))
}

pub type Result<T> = std::result::Result<T, AppError>;
