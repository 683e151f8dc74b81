//! Error types shared by the request client and the reconciliation engine.
use std::fmt;

use thiserror::Error;

use crate::summary::RunSummary;

/// Closed failure taxonomy produced at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    RateLimit,
    ServerError,
    NetworkError,
    AuthError,
    ValidationError,
    NotFoundError,
    /// Validation failure caused by a slug that already exists in the collection.
    SlugConflict,
    /// The destination could not import a remote image referenced by the payload.
    ImageImport,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::AuthError => "AUTH_ERROR",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::NotFoundError => "NOT_FOUND_ERROR",
            ErrorKind::SlugConflict => "SLUG_CONFLICT",
            ErrorKind::ImageImport => "IMAGE_IMPORT_ERROR",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Unknown failures are retried; anything caused by credentials or data is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorKind::Timeout
            | ErrorKind::RateLimit
            | ErrorKind::ServerError
            | ErrorKind::NetworkError
            | ErrorKind::UnknownError => true,
            ErrorKind::AuthError
            | ErrorKind::ValidationError
            | ErrorKind::NotFoundError
            | ErrorKind::SlugConflict
            | ErrorKind::ImageImport => false,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call to either remote system.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(kind: ErrorKind, status: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Errors raised while reconciling one item or running a whole pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Taxonomy string recorded against the item in the run summary.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Api(err) => err.kind.as_str(),
            SyncError::Validation(_) => ErrorKind::ValidationError.as_str(),
            SyncError::Io(_) | SyncError::Json(_) => ErrorKind::UnknownError.as_str(),
        }
    }

    pub fn api_kind(&self) -> Option<ErrorKind> {
        match self {
            SyncError::Api(err) => Some(err.kind),
            _ => None,
        }
    }
}

/// A run that failed outside the per-item loop. Carries whatever was
/// accumulated before the failure.
#[derive(Debug, Error)]
#[error("{} run aborted: {source}", summary.mode)]
pub struct RunAborted {
    pub summary: Box<RunSummary>,
    #[source]
    pub source: SyncError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        for kind in [
            ErrorKind::Timeout,
            ErrorKind::RateLimit,
            ErrorKind::ServerError,
            ErrorKind::NetworkError,
            ErrorKind::UnknownError,
        ] {
            assert!(kind.is_retryable(), "{kind} should retry");
        }
    }

    #[test]
    fn terminal_kinds_are_not_retryable() {
        for kind in [
            ErrorKind::AuthError,
            ErrorKind::ValidationError,
            ErrorKind::NotFoundError,
            ErrorKind::SlugConflict,
            ErrorKind::ImageImport,
        ] {
            assert!(!kind.is_retryable(), "{kind} should not retry");
        }
    }

    #[test]
    fn sync_error_category_follows_api_kind() {
        let err: SyncError = ApiError::with_status(ErrorKind::AuthError, 401, "nope").into();
        assert_eq!(err.category(), "AUTH_ERROR");
        assert_eq!(
            SyncError::Validation("missing title".into()).category(),
            "VALIDATION_ERROR"
        );
    }
}
