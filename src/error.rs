/// Unified error types for MTD synchronization
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the synchronization
#[derive(Error, Debug)]
pub enum SyncError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Remote service errors (connection failures, non-2xx responses)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed XML payloads
    #[error("XML error: {0}")]
    Xml(String),

    /// Remote identity data missing required fields
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Local state contradicting what the sync relies on
    #[error("Inconsistent local data: {0}")]
    Inconsistency(String),

    /// Configuration / validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether a database error comes from a violated constraint
    /// (unique, foreign key, not null, check).
    pub fn is_integrity_violation(&self) -> bool {
        match self {
            SyncError::Database(sqlx::Error::Database(db_err)) => !matches!(
                db_err.kind(),
                sqlx::error::ErrorKind::Other
            ),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

impl From<roxmltree::Error> for SyncError {
    fn from(err: roxmltree::Error) -> Self {
        SyncError::Xml(err.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert SyncError to HTTP response
impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            SyncError::Authentication(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AuthenticationFailed",
                self.to_string(),
            ),
            SyncError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            SyncError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            SyncError::Transport(_) => (
                StatusCode::BAD_GATEWAY,
                "UpstreamUnavailable",
                self.to_string(),
            ),
            SyncError::Database(_)
            | SyncError::Migration(_)
            | SyncError::Internal(_)
            | SyncError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let resp = SyncError::NotFound("af 12".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = SyncError::Transport("HTTP 500".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = SyncError::Internal("boom".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_non_database_errors_are_not_integrity_violations() {
        assert!(!SyncError::Internal("x".into()).is_integrity_violation());
        assert!(!SyncError::Database(sqlx::Error::RowNotFound).is_integrity_violation());
    }
}
