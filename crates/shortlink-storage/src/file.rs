//! File-backed storage implementation.
//!
//! Records live in memory and every change is appended to a JSON-lines log.
//! On open the log is replayed in order; a later line for the same short id
//! supersedes earlier ones, so a deletion is persisted by appending the
//! updated record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{HealthStatus, StorageError, StorageResult};
use crate::memory::MemoryUrlStore;
use crate::traits::{validate_record, UrlRecord, UrlStore};

/// File-backed implementation of UrlStore.
#[derive(Debug)]
pub struct FileUrlStore {
    path: PathBuf,
    memory: MemoryUrlStore,
    /// Held across the in-memory change and the append so the log order
    /// matches the order in which changes were applied.
    log: Mutex<File>,
}

impl FileUrlStore {
    /// Opens (or creates) the log at `path` and replays its contents.
    #[instrument(skip(path))]
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let memory = MemoryUrlStore::new();
        match fs::read_to_string(&path).await {
            Ok(contents) => {
                let mut replayed = 0usize;
                let mut offset = 0usize;
                let mut torn_at = None;
                for (line_no, raw) in contents.split_inclusive('\n').enumerate() {
                    let start = offset;
                    offset += raw.len();
                    let line = raw.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<UrlRecord>(line) {
                        Ok(record) => {
                            memory.restore(record);
                            replayed += 1;
                        }
                        // An unterminated last line is an interrupted append.
                        Err(e) if !raw.ends_with('\n') => {
                            warn!(
                                path = %path.display(),
                                line = line_no + 1,
                                error = %e,
                                "discarding incomplete trailing record"
                            );
                            torn_at = Some(start);
                        }
                        Err(e) => {
                            return Err(StorageError::SerializationError {
                                message: format!(
                                    "{}:{}: malformed record: {e}",
                                    path.display(),
                                    line_no + 1
                                ),
                            });
                        }
                    }
                }
                if let Some(len) = torn_at {
                    let file = OpenOptions::new().write(true).open(&path).await?;
                    file.set_len(len as u64).await?;
                }
                debug!(replayed, records = memory.len(), "Replayed storage file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            memory,
            log: Mutex::new(log),
        })
    }

    /// Path of the backing log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(log: &mut File, records: &[UrlRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record).map_err(|e| {
                StorageError::SerializationError {
                    message: e.to_string(),
                }
            })?;
            buf.push(b'\n');
        }
        log.write_all(&buf).await?;
        log.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl UrlStore for FileUrlStore {
    async fn save_url(&self, record: UrlRecord) -> StorageResult<UrlRecord> {
        validate_record(&record)?;
        let mut log = self.log.lock().await;
        let saved = self.memory.save_url(record).await?;
        if let Err(e) = Self::append(&mut log, std::slice::from_ref(&saved)).await {
            self.memory.remove(&saved);
            return Err(e);
        }
        Ok(saved)
    }

    async fn save_urls(&self, records: Vec<UrlRecord>) -> StorageResult<()> {
        let mut log = self.log.lock().await;
        self.memory.save_urls(records.clone()).await?;
        if let Err(e) = Self::append(&mut log, &records).await {
            for record in &records {
                self.memory.remove(record);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn get_url(&self, short_id: &str) -> StorageResult<UrlRecord> {
        self.memory.get_url(short_id).await
    }

    async fn get_user_urls(&self, user_id: &str) -> StorageResult<Vec<UrlRecord>> {
        self.memory.get_user_urls(user_id).await
    }

    #[instrument(skip(self, short_ids), fields(count = short_ids.len()))]
    async fn mark_as_deleted(&self, short_ids: &[String], user_id: &str) -> StorageResult<()> {
        let mut log = self.log.lock().await;
        let pending = self.memory.pending_deletions(short_ids, user_id);
        Self::append(&mut log, &pending).await?;
        for record in pending {
            self.memory.restore(record);
        }
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let start = std::time::Instant::now();
        fs::metadata(&self.path)
            .await
            .map_err(|e| StorageError::HealthCheckFailed {
                message: format!("{}: {e}", self.path.display()),
            })?;
        Ok(HealthStatus {
            healthy: true,
            latency: start.elapsed(),
            pool_stats: None,
            message: Some("file".to_string()),
        })
    }
}
