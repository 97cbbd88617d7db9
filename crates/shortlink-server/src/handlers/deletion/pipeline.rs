//! Concurrent batched deletion: splitter task, worker pool and aggregator.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use shortlink_storage::UrlStore;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::splitter::BatchSplitter;
use super::types::{
    Batch, BatchError, DeletionConfig, DeletionFailure, DeletionResult, InvalidDeletionConfig,
    PipelineStage,
};

/// Marks short URLs as deleted in bounded, concurrent batches.
///
/// A single splitter task feeds batches through a capacity-1 channel to a
/// fixed pool of workers sharing the receiver. Workers report per-batch
/// failures on an error stream that closes once every worker has exited;
/// draining it is the join barrier for the whole run.
pub struct UrlDeleter<S: UrlStore> {
    store: Arc<S>,
    config: DeletionConfig,
}

impl<S: UrlStore> std::fmt::Debug for UrlDeleter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlDeleter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: UrlStore> UrlDeleter<S> {
    /// Creates a deleter. Rejects a zero batch size or worker count.
    pub fn new(store: Arc<S>, config: DeletionConfig) -> Result<Self, InvalidDeletionConfig> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> DeletionConfig {
        self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Deletes `short_ids` on behalf of `user_id`.
    ///
    /// Returns `Ok(())` when every batch succeeded (including when there are
    /// no ids at all). Otherwise returns every batch error ordered by batch
    /// index. Once `cancel` fires, batches not yet started are reported as
    /// [`BatchError::Cancelled`] without touching the store; calls already in
    /// progress run to completion.
    pub async fn delete_urls(
        &self,
        short_ids: Vec<String>,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> DeletionResult<()> {
        let started = Instant::now();
        let id_count = short_ids.len();
        let total_batches = BatchSplitter::batch_count(id_count, self.config.batch_size);
        log_stage(PipelineStage::Idle, user_id);

        if total_batches == 0 {
            log_stage(PipelineStage::Completed, user_id);
            return Ok(());
        }

        log_stage(PipelineStage::Splitting, user_id);
        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(1);
        let splitter = BatchSplitter::new(short_ids, self.config.batch_size);
        let producer = tokio::spawn(async move {
            for batch in splitter {
                // All workers gone; nobody left to take the rest.
                if batch_tx.send(batch).await.is_err() {
                    break;
                }
            }
        });

        log_stage(PipelineStage::Dispatching, user_id);
        let batch_rx = Arc::new(Mutex::new(batch_rx));
        let (error_tx, mut error_rx) = mpsc::channel::<BatchError>(self.config.workers);
        let mut workers = JoinSet::new();

        for _ in 0..self.config.workers.min(total_batches) {
            let batch_rx = Arc::clone(&batch_rx);
            let error_tx = error_tx.clone();
            let store = Arc::clone(&self.store);
            let cancel = cancel.clone();
            let user_id = user_id.to_string();

            workers.spawn(async move {
                loop {
                    let next = batch_rx.lock().await.recv().await;
                    let Some(batch) = next else {
                        break;
                    };
                    if let Err(err) = process_batch(store.as_ref(), batch, &user_id, &cancel).await
                    {
                        if error_tx.send(err).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
        // Only workers may keep these alive, otherwise draining never ends.
        drop(batch_rx);
        drop(error_tx);

        log_stage(PipelineStage::Draining, user_id);
        let mut errors = Vec::new();
        while let Some(err) = error_rx.recv().await {
            log_batch_error(&err, user_id);
            errors.push(err);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(join_err) = joined {
                let err = BatchError::WorkerPanicked {
                    message: join_err.to_string(),
                };
                log_batch_error(&err, user_id);
                errors.push(err);
            }
        }

        if let Err(join_err) = producer.await {
            error!(user_id = %user_id, error = %join_err, "batch splitter task failed");
        }

        histogram!("shortlink_deletion_pipeline_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        log_stage(PipelineStage::Completed, user_id);

        if errors.is_empty() {
            debug!(
                user_id = %user_id,
                ids = id_count,
                batches = total_batches,
                "all deletion batches succeeded"
            );
            Ok(())
        } else {
            Err(DeletionFailure::new(total_batches, errors))
        }
    }
}

async fn process_batch<S: UrlStore>(
    store: &S,
    batch: Batch,
    user_id: &str,
    cancel: &CancellationToken,
) -> Result<(), BatchError> {
    if cancel.is_cancelled() {
        counter!("shortlink_deletion_batches_total", "status" => "cancelled").increment(1);
        return Err(BatchError::Cancelled {
            batch: batch.index,
            size: batch.len(),
        });
    }

    match store.mark_as_deleted(&batch.short_ids, user_id).await {
        Ok(()) => {
            counter!("shortlink_deletion_batches_total", "status" => "ok").increment(1);
            Ok(())
        }
        Err(source) => {
            counter!("shortlink_deletion_batches_total", "status" => "error").increment(1);
            Err(BatchError::Storage {
                batch: batch.index,
                short_ids: batch.short_ids,
                source,
            })
        }
    }
}

fn log_stage(stage: PipelineStage, user_id: &str) {
    debug!(stage = %stage, user_id = %user_id, "deletion pipeline stage");
}

fn log_batch_error(err: &BatchError, user_id: &str) {
    match err {
        BatchError::Storage {
            batch,
            short_ids,
            source,
        } => error!(
            batch = *batch,
            size = short_ids.len(),
            user_id = %user_id,
            short_ids = ?short_ids,
            error = %source,
            "deletion batch failed"
        ),
        BatchError::Cancelled { batch, size } => warn!(
            batch = *batch,
            size = *size,
            user_id = %user_id,
            "deletion batch cancelled"
        ),
        BatchError::WorkerPanicked { message } => error!(
            user_id = %user_id,
            error = %message,
            "deletion worker terminated abnormally"
        ),
    }
}
