//! Error handling for the parts inventory engine
//!
//! Every service returns [`AppResult`]. Callers map [`AppError::code`] onto
//! their own transport; the engine itself exposes no wire format.

use shared::PricingError;
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Stock errors
    #[error("Insufficient stock for part {part_id}: requested {requested}, available {available}")]
    InsufficientStock {
        part_id: Uuid,
        requested: i64,
        available: i64,
    },

    // Validation errors
    #[error("Invalid parameter {field}: {message}")]
    InvalidParameter { field: String, message: String },

    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Concurrency errors
    #[error("Concurrent update conflict: {0}")]
    ConcurrencyConflict(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::InvalidParameter { .. } => "INVALID_PARAMETER",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InvalidReference(_) => "INVALID_REFERENCE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether re-running the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict(_))
    }

    pub(crate) fn validation(field: &str, message: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// SQLSTATEs for serialization failure and deadlock; the whole operation may be retried
fn is_conflict_state(code: &str) -> bool {
    matches!(code, "40001" | "40P01")
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref().is_some_and(is_conflict_state) {
                return AppError::ConcurrencyConflict(db.message().to_string());
            }
        }
        AppError::DatabaseError(err)
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::InvalidParameter { field, message } => {
                AppError::InvalidParameter { field, message }
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("input".to_string(), "invalid input".to_string()));

        AppError::Validation { field, message }
    }
}

/// Result type alias for services
pub type AppResult<T> = Result<T, AppError>;
