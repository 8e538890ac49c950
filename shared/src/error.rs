//! Domain errors raised by the inventory core
//!
//! These carry no transport concerns; the backend maps them onto HTTP
//! responses.

use thiserror::Error;

/// Errors produced by ledger postings, state machines and token checks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Insufficient stock for variant {variant_id}: available {available}, change {requested}")]
    InsufficientStock {
        variant_id: i64,
        available: i32,
        requested: i32,
    },

    #[error("Cannot {event} a {entity} that is {from}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        event: String,
    },

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Token does not match the requested order type")]
    OrderTypeMismatch,

    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },
}

impl DomainError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_token(reason: impl Into<String>) -> Self {
        DomainError::InvalidToken(reason.into())
    }
}

/// Result alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
