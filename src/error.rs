//! Service error types with HTTP status code mapping.
//!
//! [`SegmentationError`] is the central error type. The engine produces it,
//! and the HTTP layer turns it into a structured JSON error response.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::BatchReport;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: slug must not be empty",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Transaction step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    /// `BEGIN` or `SAVEPOINT`.
    Begin,
    /// `COMMIT` or `RELEASE SAVEPOINT`.
    Commit,
    /// `ROLLBACK TO SAVEPOINT`.
    Rollback,
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Begin => "starting",
            Self::Commit => "committing",
            Self::Rollback => "rolling back",
        })
    }
}

/// Engine error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category   | HTTP Status               |
/// |-----------|------------|---------------------------|
/// | 1000–1999 | Validation | 400 Bad Request           |
/// | 3000–3999 | Store      | 500 Internal Server Error |
///
/// Absent segments or relations are never errors: deleting or removing
/// them is a no-op and reading them yields an empty result.
#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    /// The store's tables do not have the expected shape. One entry per
    /// mismatched table.
    #[error("{}", .0.join("\n"))]
    Schema(Vec<String>),

    /// A transaction could not be started, committed or rolled back.
    #[error("error while {stage} transaction: {message}")]
    Transaction {
        /// Step that failed.
        stage: TransactionStage,
        /// Driver message.
        message: String,
    },

    /// A statement violated a unique or foreign key constraint.
    #[error("{context}: {message}")]
    Constraint {
        /// What the engine was doing, with the affected slug or id.
        context: String,
        /// Driver message.
        message: String,
    },

    /// Any other statement failure.
    #[error("{context}: {message}")]
    Store {
        /// What the engine was doing, with the affected slug or id.
        context: String,
        /// Driver message.
        message: String,
    },

    /// Some units of a `modify_user` batch failed; the rest were committed.
    #[error("{0}")]
    PartialFailure(BatchReport),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SegmentationError {
    /// Builds a [`SegmentationError::Constraint`].
    pub fn constraint(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Builds a [`SegmentationError::Store`].
    pub fn store(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Builds a [`SegmentationError::Transaction`] from a driver error.
    #[must_use]
    pub fn transaction(stage: TransactionStage, err: &sqlx::Error) -> Self {
        Self::Transaction {
            stage,
            message: err.to_string(),
        }
    }

    /// Classifies a driver error raised by a statement.
    ///
    /// Constraint violations become [`SegmentationError::Constraint`], all
    /// other failures [`SegmentationError::Store`]. Only the driver's
    /// message text is kept.
    pub fn from_sqlx(context: impl Into<String>, err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation() =>
            {
                Self::constraint(context, db.message())
            }
            sqlx::Error::Database(db) => Self::store(context, db.message()),
            other => Self::store(context, other.to_string()),
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Internal(_) => 3000,
            Self::Store { .. } => 3001,
            Self::Schema(_) => 3002,
            Self::Transaction { .. } => 3003,
            Self::Constraint { .. } => 3004,
            Self::PartialFailure(_) => 3005,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Schema(_)
            | Self::Transaction { .. }
            | Self::Constraint { .. }
            | Self::Store { .. }
            | Self::PartialFailure(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::PartialFailure(report) => Some(format!(
                "{} of {} changes failed; the remaining changes were committed",
                report.failures().len(),
                report.attempted()
            )),
            _ => None,
        }
    }
}

impl IntoResponse for SegmentationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
