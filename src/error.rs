//! Error taxonomy for the row-query engine.
//!
//! Variants fall in four groups: request validation, stored-data mismatches,
//! transient infrastructure failures and bulk-job failures.

use crate::types::{DataType, RowId};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request shape.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Filter or sort names a column the table does not define.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// Operator/value combination that cannot be compiled.
    #[error("invalid value for '{op}' on column '{column}': {reason}")]
    InvalidOperand {
        column: String,
        op: String,
        reason: String,
    },

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("column '{0}' already exists")]
    ColumnExists(String),

    #[error("row {0} not found")]
    RowNotFound(RowId),

    /// Stored value does not match the column's declared type.
    #[error("column '{column}' expects {expected} but {row} holds {found}", row = row_label(.row_id))]
    TypeMismatch {
        row_id: Option<RowId>,
        column: String,
        expected: DataType,
        found: String,
    },

    /// Connection pool exhausted or closed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Remote endpoint answered with a non-success status.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("write-ahead log: {0}")]
    Wal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("bulk load failed: {0}")]
    JobFailed(String),
}

fn row_label(row_id: &Option<RowId>) -> String {
    match row_id {
        Some(id) => format!("row {}", id),
        None => "value".to_string(),
    }
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn invalid_operand(column: &str, op: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidOperand {
            column: column.to_string(),
            op: op.to_string(),
            reason: reason.into(),
        }
    }

    /// Request-shape problems detected before touching the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::UnknownColumn(_)
                | Error::InvalidOperand { .. }
                | Error::ColumnExists(_)
                | Error::TableExists(_)
        )
    }

    /// Transient failures the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_) | Error::Io(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Wal(e.to_string())
    }
}

#[cfg(feature = "http-client")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Unavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::UnknownColumn("x".into()).is_validation());
        assert!(!Error::UnknownColumn("x".into()).is_retryable());
        assert!(Error::Unavailable("pool closed".into()).is_retryable());
        assert!(!Error::JobFailed("boom".into()).is_validation());
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = Error::TypeMismatch {
            row_id: Some(RowId(7)),
            column: "age".into(),
            expected: DataType::Numeric,
            found: "\"old\"".into(),
        };
        assert_eq!(err.to_string(), "column 'age' expects numeric but row 7 holds \"old\"");
    }
}
