//! Error handling for the POS inventory server
//!
//! Maps domain and infrastructure failures onto consistent JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            e @ DomainError::InsufficientStock { .. } => AppError::InsufficientStock(e.to_string()),
            e @ DomainError::InvalidStateTransition { .. } => {
                AppError::InvalidStateTransition(e.to_string())
            }
            DomainError::InvalidToken(reason) => {
                tracing::debug!("Rejected confirmation token: {}", reason);
                AppError::InvalidToken
            }
            DomainError::OrderTypeMismatch => AppError::InvalidToken,
            DomainError::TokenExpired => AppError::TokenExpired,
            DomainError::Validation { field, message } => AppError::Validation { field, message },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationError(errors.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::TokenExpired | AppError::InvalidToken | AppError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidStateTransition(_) | AppError::InsufficientStock(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> ErrorDetail {
        match self {
            AppError::TokenExpired => ErrorDetail::new(
                "TOKEN_EXPIRED",
                "This link has expired, please request a new one",
            ),
            AppError::InvalidToken => ErrorDetail::new("INVALID_TOKEN", "Invalid token"),
            AppError::InsufficientPermissions => ErrorDetail::new(
                "INSUFFICIENT_PERMISSIONS",
                "You do not have permission to perform this action",
            ),
            AppError::Unauthorized(msg) => ErrorDetail::new("UNAUTHORIZED", msg.clone()),
            AppError::Validation { field, message } => ErrorDetail {
                code: "VALIDATION_ERROR".to_string(),
                message: message.clone(),
                field: Some(field.clone()),
            },
            AppError::ValidationError(msg) => ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            AppError::NotFound(resource) => {
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource))
            }
            AppError::InvalidStateTransition(msg) => {
                ErrorDetail::new("INVALID_STATE_TRANSITION", msg.clone())
            }
            AppError::InsufficientStock(msg) => ErrorDetail::new("INSUFFICIENT_STOCK", msg.clone()),
            AppError::DatabaseError(_) => {
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred")
            }
            AppError::Internal(msg) => ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            AppError::InternalError(_) => {
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: self.detail() })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
