//! In-memory storage implementation.
//!
//! Records are kept in a `DashMap` keyed by short id, with a second map from
//! original URL to short id so conflicts are detected without a scan.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{HealthStatus, StorageError, StorageResult};
use crate::traits::{is_valid_short_id, validate_record, UrlRecord, UrlStore};

/// In-memory implementation of UrlStore.
///
/// # Performance Characteristics
///
/// - **Save**: O(1) average
/// - **Get by short id**: O(1) average
/// - **Mark as deleted**: O(batch) with per-record shard locking
/// - **List user urls**: O(N) over all records
#[derive(Debug, Default)]
pub struct MemoryUrlStore {
    records: DashMap<String, UrlRecord>,
    /// original_url -> short_id
    by_original: DashMap<String, String>,
}

impl MemoryUrlStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of records, deleted ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts or replaces a record without conflict checks.
    ///
    /// Used when replaying a persisted log, where a later entry for the same
    /// short id supersedes an earlier one.
    pub(crate) fn restore(&self, record: UrlRecord) {
        self.by_original
            .insert(record.original_url.clone(), record.short_id.clone());
        self.records.insert(record.short_id.clone(), record);
    }

    fn insert(&self, record: UrlRecord) -> StorageResult<UrlRecord> {
        // Lock order: by_original, then records.
        let original_entry = match self.by_original.entry(record.original_url.clone()) {
            Entry::Occupied(existing) => {
                return Err(StorageError::UrlConflict {
                    original_url: record.original_url,
                    short_id: existing.get().clone(),
                });
            }
            Entry::Vacant(entry) => entry,
        };

        match self.records.entry(record.short_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateShortId {
                short_id: record.short_id,
            }),
            Entry::Vacant(entry) => {
                original_entry.insert(record.short_id.clone());
                entry.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub(crate) fn remove(&self, record: &UrlRecord) {
        self.records.remove(&record.short_id);
        self.by_original
            .remove_if(&record.original_url, |_, short_id| {
                short_id == &record.short_id
            });
    }

    /// Owned, live records that `short_ids` would delete, already flagged.
    ///
    /// Nothing is changed; apply the result with [`Self::restore`].
    pub(crate) fn pending_deletions(&self, short_ids: &[String], user_id: &str) -> Vec<UrlRecord> {
        let mut seen = HashSet::new();
        short_ids
            .iter()
            .filter(|short_id| is_valid_short_id(short_id) && seen.insert(short_id.as_str()))
            .filter_map(|short_id| self.records.get(short_id))
            .filter(|record| record.user_id == user_id && !record.is_deleted)
            .map(|record| UrlRecord {
                is_deleted: true,
                ..record.clone()
            })
            .collect()
    }

    /// Flags owned records as deleted and returns the ones that changed.
    pub(crate) fn mark_deleted_records(&self, short_ids: &[String], user_id: &str) -> Vec<UrlRecord> {
        let mut changed = Vec::new();
        for short_id in short_ids {
            if !is_valid_short_id(short_id) {
                continue;
            }
            if let Some(mut record) = self.records.get_mut(short_id) {
                if record.user_id == user_id && !record.is_deleted {
                    record.is_deleted = true;
                    changed.push(record.clone());
                }
            }
        }
        changed
    }
}

#[async_trait]
impl UrlStore for MemoryUrlStore {
    #[instrument(skip(self, record), fields(short_id = %record.short_id))]
    async fn save_url(&self, record: UrlRecord) -> StorageResult<UrlRecord> {
        validate_record(&record)?;
        self.insert(record)
    }

    async fn save_urls(&self, records: Vec<UrlRecord>) -> StorageResult<()> {
        for record in &records {
            validate_record(record)?;
        }

        let mut inserted: Vec<UrlRecord> = Vec::with_capacity(records.len());
        for record in records {
            match self.insert(record) {
                Ok(saved) => inserted.push(saved),
                Err(e) => {
                    // Roll back so the batch is all-or-nothing.
                    for saved in &inserted {
                        self.remove(saved);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn get_url(&self, short_id: &str) -> StorageResult<UrlRecord> {
        self.records
            .get(short_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StorageError::NotFound {
                short_id: short_id.to_string(),
            })
    }

    async fn get_user_urls(&self, user_id: &str) -> StorageResult<Vec<UrlRecord>> {
        let mut urls: Vec<UrlRecord> = self
            .records
            .iter()
            .filter(|r| r.user_id == user_id && !r.is_deleted)
            .map(|r| r.value().clone())
            .collect();
        urls.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.short_id.cmp(&b.short_id))
        });
        Ok(urls)
    }

    #[instrument(skip(self, short_ids), fields(count = short_ids.len()))]
    async fn mark_as_deleted(&self, short_ids: &[String], user_id: &str) -> StorageResult<()> {
        self.mark_deleted_records(short_ids, user_id);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let start = Instant::now();
        Ok(HealthStatus {
            healthy: true,
            latency: start.elapsed(),
            pool_stats: None,
            message: Some("memory".to_string()),
        })
    }
}
