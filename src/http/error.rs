//! HTTP mapping of `Error`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::Error;

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::UnknownColumn(_) | Error::InvalidOperand { .. } => StatusCode::BAD_REQUEST,
            Error::TableExists(_) | Error::ColumnExists(_) => StatusCode::CONFLICT,
            Error::TableNotFound(_) | Error::RowNotFound(_) | Error::JobNotFound(_) => StatusCode::NOT_FOUND,
            Error::TypeMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Unavailable(_) | Error::Io(_) | Error::Wal(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Error::Encoding(_) | Error::JobFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, RowId};

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::UnknownColumn("c".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::TableNotFound("t".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::RowNotFound(RowId(1)).status_code(), StatusCode::NOT_FOUND);
        let mismatch = Error::TypeMismatch {
            row_id: None,
            column: "age".into(),
            expected: DataType::Numeric,
            found: "\"abc\"".into(),
        };
        assert_eq!(mismatch.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(Error::Unavailable("pool".into()).status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(Error::JobFailed("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Error::Rejected { status: 418, message: "tea".into() }.status_code().as_u16(), 418);
    }
}
