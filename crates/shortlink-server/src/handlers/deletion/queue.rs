//! Supervised background execution of deletion requests.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use shortlink_storage::UrlStore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::pipeline::UrlDeleter;
use super::types::DeletionRequest;

/// Error returned when a deletion cannot be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("deletion queue is shutting down")]
    ShuttingDown,
}

/// Runs deletion requests in the background, detached from the request
/// that submitted them but owned by the service.
///
/// Every submission is tracked; [`DeletionQueue::shutdown`] waits for
/// in-flight work to drain and cancels whatever is still running once the
/// grace period is over.
pub struct DeletionQueue<S: UrlStore> {
    deleter: Arc<UrlDeleter<S>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl<S: UrlStore> Clone for DeletionQueue<S> {
    fn clone(&self) -> Self {
        Self {
            deleter: Arc::clone(&self.deleter),
            tracker: self.tracker.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: UrlStore> std::fmt::Debug for DeletionQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("deleter", &self.deleter)
            .field("in_flight", &self.tracker.len())
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl<S: UrlStore> DeletionQueue<S> {
    pub fn new(deleter: UrlDeleter<S>) -> Self {
        Self {
            deleter: Arc::new(deleter),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Schedules `request` and returns immediately.
    ///
    /// The outcome is only logged; callers never observe it.
    pub fn submit(&self, request: DeletionRequest) -> Result<(), SubmitError> {
        if self.tracker.is_closed() || self.shutdown.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }

        counter!("shortlink_deletion_requests_total").increment(1);
        let deleter = Arc::clone(&self.deleter);
        let cancel = self.shutdown.child_token();

        self.tracker.spawn(async move {
            let DeletionRequest { user_id, short_ids } = request;
            let count = short_ids.len();
            match deleter.delete_urls(short_ids, &user_id, &cancel).await {
                Ok(()) => info!(user_id = %user_id, count, "background deletion completed"),
                Err(failure) => warn!(
                    user_id = %user_id,
                    count,
                    failed_batches = failure.errors().len(),
                    total_batches = failure.total_batches(),
                    cancelled = failure.is_cancelled(),
                    error = %failure,
                    "background deletion finished with errors"
                ),
            }
        });
        Ok(())
    }

    /// Number of deletions still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Stops accepting work and drains what is running.
    ///
    /// Waits up to `grace` for in-flight deletions, then cancels the rest and
    /// waits for their workers to finish. Returns `true` if everything
    /// drained within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        info!(in_flight = self.tracker.len(), "draining background deletions");

        let drained = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            warn!(
                in_flight = self.tracker.len(),
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "grace period elapsed; cancelling remaining deletions"
            );
        }

        self.shutdown.cancel();
        self.tracker.wait().await;
        drained
    }
}
