//! Unified error type for the report core
//!
//! Every repository and service returns `CoreResult<T>`. Store errors are
//! classified once, here, so callers only ever see the six kinds below.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Cancelled(_) => "CANCELLED",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// Postgres SQLSTATE codes we classify explicitly.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("record".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => Self::Conflict(
                    db.constraint()
                        .map(|c| format!("unique constraint {c} violated"))
                        .unwrap_or_else(|| db.message().to_string()),
                ),
                Some(FOREIGN_KEY_VIOLATION) => {
                    Self::Validation(format!("referenced record missing: {}", db.message()))
                }
                Some(CHECK_VIOLATION) | Some(INVALID_TEXT_REPRESENTATION) => {
                    Self::Validation(db.message().to_string())
                }
                _ => {
                    tracing::error!(error = ?err, "Database error");
                    Self::StoreUnavailable(db.message().to_string())
                }
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                tracing::error!(error = ?err, "Row decode error");
                Self::StoreUnavailable("stored row could not be decoded".to_string())
            }
            _ => {
                tracing::error!(error = ?err, "Store error");
                Self::StoreUnavailable(err.to_string())
            }
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
