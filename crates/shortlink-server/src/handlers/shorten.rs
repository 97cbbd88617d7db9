//! Shortening, expansion and per-user listing of URLs.

use std::collections::HashSet;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use shortlink_storage::{
    validate_short_id, HealthStatus, StorageError, UrlRecord, UrlStore, MAX_URL_LENGTH,
};
use tracing::{debug, instrument};

use super::deletion::{DeletionQueue, DeletionRequest, SubmitError};

/// Length of generated short ids.
pub const SHORT_ID_LENGTH: usize = 8;

/// How many fresh ids to try before giving up on a collision streak.
const MAX_ID_ATTEMPTS: usize = 5;

/// Errors surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum ShortenError {
    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("URL is already shortened as {short_id}")]
    Conflict { short_id: String },

    #[error("short URL not found: {short_id}")]
    NotFound { short_id: String },

    #[error("short URL has been deleted: {short_id}")]
    Gone { short_id: String },

    #[error("batch request is empty")]
    EmptyBatch,

    #[error("could not allocate a unique short id after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// One entry of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// One entry of a batch shorten response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShortened {
    pub correlation_id: String,
    pub short_id: String,
}

/// Generates a random alphanumeric short id.
pub fn generate_short_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHORT_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Checks that `raw` is an absolute http(s) URL and returns it trimmed.
pub fn validate_url(raw: &str) -> Result<String, ShortenError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ShortenError::InvalidUrl {
            message: "URL is empty".to_string(),
        });
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(ShortenError::InvalidUrl {
            message: format!("URL exceeds {MAX_URL_LENGTH} bytes"),
        });
    }

    let parsed = url::Url::parse(trimmed).map_err(|e| ShortenError::InvalidUrl {
        message: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ShortenError::InvalidUrl {
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ShortenError::InvalidUrl {
            message: "URL has no host".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Business logic shared by the HTTP and gRPC front ends.
pub struct Shortener<S: UrlStore> {
    store: Arc<S>,
    deletions: DeletionQueue<S>,
    base_url: String,
}

impl<S: UrlStore> Clone for Shortener<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            deletions: self.deletions.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

impl<S: UrlStore> std::fmt::Debug for Shortener<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shortener")
            .field("base_url", &self.base_url)
            .field("deletions", &self.deletions)
            .finish_non_exhaustive()
    }
}

impl<S: UrlStore> Shortener<S> {
    pub fn new(store: Arc<S>, deletions: DeletionQueue<S>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            store,
            deletions,
            base_url,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn deletions(&self) -> &DeletionQueue<S> {
        &self.deletions
    }

    /// Public URL for `short_id`.
    pub fn short_url(&self, short_id: &str) -> String {
        format!("{}/{}", self.base_url, short_id)
    }

    /// Shortens `original_url` for `user_id` and returns the new short id.
    ///
    /// An already-shortened URL yields [`ShortenError::Conflict`] carrying
    /// the existing id.
    #[instrument(skip(self, original_url))]
    pub async fn shorten(&self, original_url: &str, user_id: &str) -> Result<String, ShortenError> {
        let original_url = validate_url(original_url)?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let record = UrlRecord::new(generate_short_id(), original_url.clone(), user_id);
            match self.store.save_url(record).await {
                Ok(saved) => {
                    debug!(short_id = %saved.short_id, "shortened URL");
                    return Ok(saved.short_id);
                }
                Err(StorageError::DuplicateShortId { short_id }) => {
                    debug!(short_id = %short_id, "short id collision, retrying");
                }
                Err(StorageError::UrlConflict { short_id, .. }) => {
                    return Err(ShortenError::Conflict { short_id });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ShortenError::IdSpaceExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Shortens every item or none of them.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        user_id: &str,
    ) -> Result<Vec<BatchShortened>, ShortenError> {
        if items.is_empty() {
            return Err(ShortenError::EmptyBatch);
        }
        let items = items
            .into_iter()
            .map(|item| {
                Ok(BatchItem {
                    original_url: validate_url(&item.original_url)?,
                    correlation_id: item.correlation_id,
                })
            })
            .collect::<Result<Vec<_>, ShortenError>>()?;

        let mut distinct = HashSet::with_capacity(items.len());
        if let Some(repeated) = items
            .iter()
            .find(|item| !distinct.insert(item.original_url.as_str()))
        {
            return Err(ShortenError::InvalidUrl {
                message: format!(
                    "URL appears more than once in batch: {}",
                    repeated.original_url
                ),
            });
        }

        for _ in 0..MAX_ID_ATTEMPTS {
            let mut taken = HashSet::with_capacity(items.len());
            let records: Vec<UrlRecord> = items
                .iter()
                .map(|item| {
                    let mut short_id = generate_short_id();
                    while !taken.insert(short_id.clone()) {
                        short_id = generate_short_id();
                    }
                    UrlRecord::new(short_id, item.original_url.clone(), user_id)
                })
                .collect();

            let shortened: Vec<BatchShortened> = items
                .iter()
                .zip(&records)
                .map(|(item, record)| BatchShortened {
                    correlation_id: item.correlation_id.clone(),
                    short_id: record.short_id.clone(),
                })
                .collect();

            match self.store.save_urls(records).await {
                Ok(()) => return Ok(shortened),
                Err(StorageError::DuplicateShortId { short_id }) => {
                    debug!(short_id = %short_id, "short id collision in batch, retrying");
                }
                Err(StorageError::UrlConflict { short_id, .. }) => {
                    return Err(ShortenError::Conflict { short_id });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ShortenError::IdSpaceExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Resolves `short_id` to its original URL.
    pub async fn expand(&self, short_id: &str) -> Result<String, ShortenError> {
        let not_found = || ShortenError::NotFound {
            short_id: short_id.to_string(),
        };
        validate_short_id(short_id).map_err(|_| not_found())?;

        let record = match self.store.get_url(short_id).await {
            Ok(record) => record,
            Err(StorageError::NotFound { .. }) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if record.is_deleted {
            return Err(ShortenError::Gone {
                short_id: record.short_id,
            });
        }
        Ok(record.original_url)
    }

    /// Live URLs owned by `user_id`, oldest first.
    pub async fn user_urls(&self, user_id: &str) -> Result<Vec<UrlRecord>, ShortenError> {
        Ok(self.store.get_user_urls(user_id).await?)
    }

    /// Schedules deletion of `short_ids` and returns without waiting.
    pub fn delete_urls(&self, user_id: &str, short_ids: Vec<String>) -> Result<(), ShortenError> {
        debug!(user_id = %user_id, count = short_ids.len(), "scheduling deletion");
        self.deletions
            .submit(DeletionRequest::new(user_id, short_ids))?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<HealthStatus, ShortenError> {
        let status = self.store.health_check().await?;
        if !status.healthy {
            return Err(ShortenError::Storage(StorageError::HealthCheckFailed {
                message: status
                    .message
                    .unwrap_or_else(|| "storage reported unhealthy".to_string()),
            }));
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shortlink_storage::MemoryUrlStore;

    use super::*;
    use crate::handlers::deletion::{DeletionConfig, UrlDeleter};

    fn shortener() -> Shortener<MemoryUrlStore> {
        let store = MemoryUrlStore::new_shared();
        let deleter = UrlDeleter::new(store.clone(), DeletionConfig::default()).unwrap();
        Shortener::new(store, DeletionQueue::new(deleter), "http://localhost:8080/")
    }

    #[test]
    fn test_generated_ids_are_valid() {
        for _ in 0..100 {
            let id = generate_short_id();
            assert_eq!(id.len(), SHORT_ID_LENGTH);
            assert!(shortlink_storage::is_valid_short_id(&id));
        }
    }

    #[test]
    fn test_url_validation() {
        assert_eq!(
            validate_url("  https://example.com/a  ").unwrap(),
            "https://example.com/a"
        );
        assert!(validate_url("http://example.com").is_ok());
        for bad in ["", "   ", "example.com", "ftp://example.com", "https://", "not a url"] {
            assert!(
                matches!(validate_url(bad), Err(ShortenError::InvalidUrl { .. })),
                "{bad:?} should be rejected"
            );
        }
        let too_long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(validate_url(&too_long).is_err());
    }

    #[test]
    fn test_short_url_joins_base() {
        let s = shortener();
        assert_eq!(s.short_url("abc"), "http://localhost:8080/abc");
    }

    #[tokio::test]
    async fn test_shorten_then_expand() {
        let s = shortener();
        let id = s.shorten("https://example.com/page", "alice").await.unwrap();
        assert_eq!(s.expand(&id).await.unwrap(), "https://example.com/page");
    }

    #[tokio::test]
    async fn test_shorten_conflict_returns_existing_id() {
        let s = shortener();
        let first = s.shorten("https://example.com/page", "alice").await.unwrap();
        match s.shorten("https://example.com/page", "bob").await {
            Err(ShortenError::Conflict { short_id }) => assert_eq!(short_id, first),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expand_unknown_and_invalid_ids() {
        let s = shortener();
        assert!(matches!(
            s.expand("missing").await,
            Err(ShortenError::NotFound { .. })
        ));
        assert!(matches!(
            s.expand("bad id!").await,
            Err(ShortenError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_shorten_keeps_correlation_ids() {
        let s = shortener();
        let items = vec![
            BatchItem {
                correlation_id: "one".to_string(),
                original_url: "https://example.com/1".to_string(),
            },
            BatchItem {
                correlation_id: "two".to_string(),
                original_url: "https://example.com/2".to_string(),
            },
        ];

        let shortened = s.shorten_batch(items, "alice").await.unwrap();

        assert_eq!(shortened.len(), 2);
        assert_eq!(shortened[0].correlation_id, "one");
        assert_eq!(shortened[1].correlation_id, "two");
        assert_eq!(
            s.expand(&shortened[1].short_id).await.unwrap(),
            "https://example.com/2"
        );
        assert_eq!(s.user_urls("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_shorten_rejects_empty_and_invalid() {
        let s = shortener();
        assert!(matches!(
            s.shorten_batch(Vec::new(), "alice").await,
            Err(ShortenError::EmptyBatch)
        ));

        let items = vec![
            BatchItem {
                correlation_id: "ok".to_string(),
                original_url: "https://example.com/ok".to_string(),
            },
            BatchItem {
                correlation_id: "bad".to_string(),
                original_url: "nope".to_string(),
            },
        ];
        assert!(matches!(
            s.shorten_batch(items, "alice").await,
            Err(ShortenError::InvalidUrl { .. })
        ));
        assert!(s.user_urls("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_shorten_rejects_repeated_url() {
        let s = shortener();
        let items = vec![
            BatchItem {
                correlation_id: "1".to_string(),
                original_url: "https://dup.example".to_string(),
            },
            BatchItem {
                correlation_id: "2".to_string(),
                original_url: " https://dup.example ".to_string(),
            },
        ];

        let err = s.shorten_batch(items, "alice").await.unwrap_err();

        assert!(
            matches!(&err, ShortenError::InvalidUrl { message } if message.contains("more than once")),
            "{err:?}"
        );
        assert!(s.user_urls("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_url_is_gone() {
        let s = shortener();
        let id = s.shorten("https://example.com/gone", "alice").await.unwrap();

        s.delete_urls("alice", vec![id.clone()]).unwrap();
        assert!(s.deletions().shutdown(Duration::from_secs(5)).await);

        assert!(matches!(s.expand(&id).await, Err(ShortenError::Gone { .. })));
        assert!(s.user_urls("alice").await.unwrap().is_empty());
        assert!(matches!(
            s.delete_urls("alice", vec![id]),
            Err(ShortenError::Submit(SubmitError::ShuttingDown))
        ));
    }

    #[tokio::test]
    async fn test_ping_reports_healthy_store() {
        let s = shortener();
        assert!(s.ping().await.unwrap().healthy);
    }
}
