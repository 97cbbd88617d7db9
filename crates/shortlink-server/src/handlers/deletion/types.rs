//! Data types for batched URL deletion.

use std::fmt;

use shortlink_storage::StorageError;

/// Maximum number of short ids handed to the store in one call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Number of concurrent deletion workers.
/// Bounds load on the storage backend rather than saturating it.
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// A request to delete short URLs on behalf of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    /// The user every short id is attributed to.
    pub user_id: String,
    /// Short ids in request order.
    pub short_ids: Vec<String>,
}

impl DeletionRequest {
    /// Creates a new deletion request.
    pub fn new(user_id: impl Into<String>, short_ids: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            short_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.short_ids.is_empty()
    }
}

/// A contiguous slice of one request's short ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based position of this batch within the request.
    pub index: usize,
    pub short_ids: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.short_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.short_ids.is_empty()
    }
}

/// Pipeline tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionConfig {
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKER_COUNT,
        }
    }
}

impl DeletionConfig {
    /// Checks that both the batch size and the worker count are non-zero.
    pub fn validate(&self) -> Result<(), InvalidDeletionConfig> {
        if self.batch_size == 0 {
            return Err(InvalidDeletionConfig::ZeroBatchSize);
        }
        if self.workers == 0 {
            return Err(InvalidDeletionConfig::ZeroWorkers);
        }
        Ok(())
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Rejected pipeline tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidDeletionConfig {
    #[error("deletion batch size must be greater than zero")]
    ZeroBatchSize,
    #[error("deletion worker count must be greater than zero")]
    ZeroWorkers,
}

/// Stages a single pipeline invocation moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Splitting,
    Dispatching,
    Draining,
    Completed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Splitting => "splitting",
            PipelineStage::Dispatching => "dispatching",
            PipelineStage::Draining => "draining",
            PipelineStage::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Failure of a single batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The operation was cancelled before this batch was dispatched.
    #[error("batch {batch} ({size} ids) cancelled before dispatch")]
    Cancelled { batch: usize, size: usize },

    /// The store rejected the batch.
    #[error("batch {batch} failed: {source}")]
    Storage {
        batch: usize,
        short_ids: Vec<String>,
        #[source]
        source: StorageError,
    },

    /// A worker task panicked or was aborted; its remaining batches were not reported.
    #[error("deletion worker terminated abnormally: {message}")]
    WorkerPanicked { message: String },
}

impl BatchError {
    /// Batch index this error belongs to, if it belongs to one.
    pub fn batch(&self) -> Option<usize> {
        match self {
            BatchError::Cancelled { batch, .. } | BatchError::Storage { batch, .. } => {
                Some(*batch)
            }
            BatchError::WorkerPanicked { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchError::Cancelled { .. })
    }
}

/// Aggregate outcome of a pipeline run in which at least one batch failed.
///
/// Holds every batch error ordered by batch index; worker failures that are
/// not tied to a batch come last.
#[derive(Debug)]
pub struct DeletionFailure {
    total_batches: usize,
    errors: Vec<BatchError>,
}

impl DeletionFailure {
    pub(crate) fn new(total_batches: usize, mut errors: Vec<BatchError>) -> Self {
        debug_assert!(!errors.is_empty());
        errors.sort_by_key(|e| e.batch().unwrap_or(usize::MAX));
        Self {
            total_batches,
            errors,
        }
    }

    /// Number of batches the request was split into.
    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    /// All batch errors, ordered by batch index.
    pub fn errors(&self) -> &[BatchError] {
        &self.errors
    }

    /// A single representative error: the one for the highest batch index.
    pub fn last(&self) -> &BatchError {
        // Constructed only with at least one error.
        &self.errors[self.errors.len() - 1]
    }

    /// True when every failure was a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.errors.iter().all(BatchError::is_cancelled)
    }

    pub fn into_errors(self) -> Vec<BatchError> {
        self.errors
    }
}

impl fmt::Display for DeletionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} deletion batches failed; last error: {}",
            self.errors.len(),
            self.total_batches,
            self.last()
        )
    }
}

impl std::error::Error for DeletionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.last())
    }
}

/// Result type for deletion operations.
pub type DeletionResult<T> = Result<T, DeletionFailure>;
