//! Storage error types.

use std::time::Duration;

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No record exists for the short id.
    #[error("short url not found: {short_id}")]
    NotFound { short_id: String },

    /// The original URL has already been shortened.
    ///
    /// Carries the short id of the existing record so callers can return it.
    #[error("url already shortened: {original_url} -> {short_id}")]
    UrlConflict {
        original_url: String,
        short_id: String,
    },

    /// The short id is already taken by another record.
    #[error("short id already exists: {short_id}")]
    DuplicateShortId { short_id: String },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Query exceeded its timeout.
    #[error("query timeout: {operation} exceeded {timeout:?}")]
    QueryTimeout {
        operation: String,
        timeout: Duration,
    },

    /// Health check failed.
    #[error("health check failed: {message}")]
    HealthCheckFailed { message: String },

    /// File backend I/O error.
    #[error("storage file error: {message}")]
    IoError { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Serialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Returns true for failures caused by the backend being unreachable or slow,
    /// as opposed to a problem with the request itself.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StorageError::ConnectionError { .. }
                | StorageError::QueryTimeout { .. }
                | StorageError::HealthCheckFailed { .. }
        )
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            message: err.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Connection pool statistics reported by database backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub active_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
}

/// Result of a storage health check.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency: Duration,
    pub pool_stats: Option<PoolStats>,
    /// Backend name or diagnostic message.
    pub message: Option<String>,
}
