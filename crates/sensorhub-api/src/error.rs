//! Error types for the SensorHub API.
//!
//! [`ApiError`] unifies all failure modes into a single enum that can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Every
//! error body has the shape `{"error": "...", "status": 400}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sensorhub_core::IngestError;
use sensorhub_db::DbError;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body or query was malformed or out of range.
    #[error("{0}")]
    BadRequest(String),

    /// A UUID could not be parsed from the request path.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// The requested resource was not found.
    #[error("{0}")]
    NotFound(String),

    /// The submission deadline passed before the writer replied.
    #[error("request timeout")]
    Timeout,

    /// The submission was cancelled before the writer replied.
    #[error("request cancelled by client")]
    Cancelled,

    /// The store or the writer failed.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// The HTTP status this error maps to.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidUuid(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Timeout | Self::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(msg) => Self::BadRequest(msg),
            IngestError::Timeout => Self::Timeout,
            IngestError::Cancelled => Self::Cancelled,
            IngestError::Persistence(e) => {
                Self::Internal(format!("failed to store sensor data: {e}"))
            }
            err @ IngestError::WriterUnavailable => Self::Internal(err.to_string()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => Self::NotFound(format!("reading {id} not found")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use sensorhub_types::ReadingId;

    use super::*;

    #[test]
    fn ingest_failures_map_to_distinct_statuses() {
        let cases = [
            (IngestError::Validation("bad".to_owned()), StatusCode::BAD_REQUEST),
            (IngestError::Timeout, StatusCode::REQUEST_TIMEOUT),
            (IngestError::Cancelled, StatusCode::REQUEST_TIMEOUT),
            (
                IngestError::Persistence(DbError::Unavailable("down".to_owned())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (IngestError::WriterUnavailable, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn timeout_messages_are_distinguishable() {
        assert_eq!(ApiError::Timeout.to_string(), "request timeout");
        assert_eq!(ApiError::Cancelled.to_string(), "request cancelled by client");
    }

    #[test]
    fn missing_reading_is_not_found() {
        let err = ApiError::from(DbError::NotFound(ReadingId::new()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
