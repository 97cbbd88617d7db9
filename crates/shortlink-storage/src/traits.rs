//! UrlStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HealthStatus, StorageError, StorageResult};

/// Maximum length of a short id.
pub const MAX_SHORT_ID_LENGTH: usize = 64;

/// Maximum length of an original URL.
pub const MAX_URL_LENGTH: usize = 2048;

/// A stored short URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Unique key under which the original URL is stored.
    pub short_id: String,
    pub original_url: String,
    /// Owner of the record.
    pub user_id: String,
    /// Set by deletion; the record itself is never removed.
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl UrlRecord {
    /// Creates a new, live record stamped with the current time.
    pub fn new(
        short_id: impl Into<String>,
        original_url: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            short_id: short_id.into(),
            original_url: original_url.into(),
            user_id: user_id.into(),
            is_deleted: false,
            created_at: Utc::now(),
        }
    }
}

/// Abstract storage interface for short URLs.
///
/// Implementations must be thread-safe (Send + Sync): the deletion pipeline
/// calls `mark_as_deleted` from several workers at once on the same instance.
#[async_trait]
pub trait UrlStore: Send + Sync + 'static {
    /// Saves a single record.
    ///
    /// Returns `StorageError::UrlConflict` carrying the existing short id when
    /// the original URL is already stored, and `StorageError::DuplicateShortId`
    /// when the short id is taken.
    async fn save_url(&self, record: UrlRecord) -> StorageResult<UrlRecord>;

    /// Saves several records at once. Either all are stored or none are.
    async fn save_urls(&self, records: Vec<UrlRecord>) -> StorageResult<()>;

    /// Gets a record by short id, including deleted ones.
    async fn get_url(&self, short_id: &str) -> StorageResult<UrlRecord>;

    /// Lists the live (not deleted) records owned by a user, oldest first.
    async fn get_user_urls(&self, user_id: &str) -> StorageResult<Vec<UrlRecord>>;

    /// Flags the given short ids as deleted.
    ///
    /// Only records owned by `user_id` are touched. Unknown ids, ids owned by
    /// other users and syntactically invalid ids are skipped without error.
    /// Calling it again for already deleted records is a no-op.
    async fn mark_as_deleted(&self, short_ids: &[String], user_id: &str) -> StorageResult<()>;

    /// Checks that the backend is reachable.
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}

/// Returns true if `short_id` has the shape of a generated short code.
pub fn is_valid_short_id(short_id: &str) -> bool {
    !short_id.is_empty()
        && short_id.len() <= MAX_SHORT_ID_LENGTH
        && short_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Validates a short id before it is written.
pub fn validate_short_id(short_id: &str) -> StorageResult<()> {
    if is_valid_short_id(short_id) {
        Ok(())
    } else {
        Err(StorageError::InvalidInput {
            message: format!("invalid short id: {short_id:?}"),
        })
    }
}

/// Validates a record before it is written.
pub fn validate_record(record: &UrlRecord) -> StorageResult<()> {
    validate_short_id(&record.short_id)?;
    if record.original_url.trim().is_empty() {
        return Err(StorageError::InvalidInput {
            message: "original url cannot be empty".to_string(),
        });
    }
    if record.original_url.len() > MAX_URL_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!("original url exceeds {MAX_URL_LENGTH} bytes"),
        });
    }
    if record.user_id.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "user id cannot be empty".to_string(),
        });
    }
    Ok(())
}
