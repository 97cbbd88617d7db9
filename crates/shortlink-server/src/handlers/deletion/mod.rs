//! Batched, concurrent deletion of short URLs.
//!
//! [`UrlDeleter`] runs one request to completion: a splitter feeds fixed-size
//! batches to a bounded worker pool and an aggregator collects the per-batch
//! failures. [`DeletionQueue`] runs requests in the background and drains
//! them on shutdown.

mod pipeline;
mod queue;
mod splitter;
mod types;


pub use pipeline::UrlDeleter;
pub use queue::{DeletionQueue, SubmitError};
pub use splitter::BatchSplitter;
pub use types::{
    Batch, BatchError, DeletionConfig, DeletionFailure, DeletionRequest, DeletionResult,
    InvalidDeletionConfig, PipelineStage, DEFAULT_BATCH_SIZE, DEFAULT_WORKER_COUNT,
};
