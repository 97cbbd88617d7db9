//! Shared error classification for the HTTP and gRPC layers.
//!
//! Both front ends turn a [`ShortenError`] into an [`ErrorKind`] first and map
//! that to their own status type, so the two stay consistent. Internal
//! details are logged here and replaced with generic messages.

use shortlink_server::handlers::deletion::SubmitError;
use shortlink_server::ShortenError;
use shortlink_storage::StorageError;
use tracing::error;

/// Protocol-agnostic classification of an API error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// 400 / INVALID_ARGUMENT
    InvalidInput(String),
    /// 409 / ALREADY_EXISTS, carrying the existing short id.
    Conflict { short_id: String },
    /// 404 / NOT_FOUND
    NotFound(String),
    /// 410 / FAILED_PRECONDITION
    Gone(String),
    /// 503 / UNAVAILABLE
    Unavailable(String),
    /// 504 / DEADLINE_EXCEEDED
    Timeout(String),
    /// 500 / INTERNAL
    Internal(String),
}

/// Classifies `err`, logging anything that is not the caller's fault.
pub fn classify(err: &ShortenError) -> ErrorKind {
    match err {
        ShortenError::InvalidUrl { .. } | ShortenError::EmptyBatch => {
            ErrorKind::InvalidInput(err.to_string())
        }
        ShortenError::Conflict { short_id } => ErrorKind::Conflict {
            short_id: short_id.clone(),
        },
        ShortenError::NotFound { .. } => ErrorKind::NotFound(err.to_string()),
        ShortenError::Gone { .. } => ErrorKind::Gone(err.to_string()),
        ShortenError::Submit(SubmitError::ShuttingDown) => {
            ErrorKind::Unavailable("service is shutting down".to_string())
        }
        ShortenError::IdSpaceExhausted { .. } => {
            error!(error = %err, "short id allocation failed");
            ErrorKind::Internal("could not allocate a short id".to_string())
        }
        ShortenError::Storage(storage) => classify_storage(storage),
    }
}

fn classify_storage(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::InvalidInput { message } => ErrorKind::InvalidInput(message.clone()),
        StorageError::NotFound { short_id } => {
            ErrorKind::NotFound(format!("short URL not found: {short_id}"))
        }
        StorageError::UrlConflict { short_id, .. } => ErrorKind::Conflict {
            short_id: short_id.clone(),
        },
        StorageError::ConnectionError { .. } | StorageError::HealthCheckFailed { .. } => {
            error!(error = %err, "storage unavailable");
            ErrorKind::Unavailable("storage backend unavailable".to_string())
        }
        StorageError::QueryTimeout { .. } => {
            error!(error = %err, "storage query timed out");
            ErrorKind::Timeout("storage operation timed out".to_string())
        }
        _ => {
            error!(error = %err, "storage error");
            ErrorKind::Internal("internal storage error".to_string())
        }
    }
}
