//! Error handling for the Warehouse Inventory Tracker
//!
//! Every error is returned as `{ "error": { "code", "message", "field" } }`.
//! All mutations run inside a single database transaction, so any error
//! response means nothing was written.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::LedgerError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Insufficient inventory: {0}")]
    InsufficientInventory(String),

    // Database errors
    #[error("Storage failure during {operation} ({context}): {source}")]
    Storage {
        operation: &'static str,
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    fn is_server_error(&self) -> bool {
        matches!(self, AppError::Storage { .. } | AppError::DatabaseError(_))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let (field, message) = field_errors
            .iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("request".to_string(), errors.to_string()));
        AppError::Validation { field, message }
    }
}

/// Attach the failing operation and identifiers to a storage error
pub trait StorageContext<T> {
    fn during(self, operation: &'static str, context: impl std::fmt::Display) -> AppResult<T>;
}

impl<T> StorageContext<T> for Result<T, sqlx::Error> {
    fn during(self, operation: &'static str, context: impl std::fmt::Display) -> AppResult<T> {
        self.map_err(|source| {
            if let Some(db_err) = source.as_database_error() {
                if db_err.is_unique_violation() {
                    let resource = db_err.constraint().unwrap_or(operation).to_string();
                    return AppError::Conflict {
                        message: format!("{} conflicts with an existing record", context),
                        resource,
                    };
                }
            }
            AppError::Storage {
                operation,
                context: context.to_string(),
                source,
            }
        })
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
    fn new(code: &str, message: impl Into<String>, field: Option<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                    None,
                ),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone(), Some(field.clone())),
            ),
            AppError::Ledger(LedgerError::InvalidTransition { .. }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INVALID_STATE_TRANSITION",
                    self.to_string(),
                    Some("status".to_string()),
                ),
            ),
            AppError::Ledger(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "QUANTITY_RULE_VIOLATION",
                    err.to_string(),
                    Some(err.field().to_string()),
                ),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone(), Some(resource.clone())),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource), None),
            ),
            AppError::InsufficientInventory(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INSUFFICIENT_INVENTORY",
                    msg.clone(),
                    Some("outgoing_quantity".to_string()),
                ),
            ),
            AppError::Storage { .. } | AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "DATABASE_ERROR",
                    "A database error occurred; no changes were saved",
                    None,
                ),
            ),
        };

        if self.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::warn!(code = %error_detail.code, "{}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
