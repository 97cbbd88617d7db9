//! Prometheus metrics infrastructure.
//!
//! # Metrics Exposed
//!
//! - `shortlink_http_requests_total` - HTTP requests by method, path, status class
//! - `shortlink_http_request_duration_seconds` - HTTP request duration
//! - `shortlink_deletion_requests_total` - Deletion requests accepted
//! - `shortlink_deletion_batches_total` - Deletion batches by status (ok, error, cancelled)
//! - `shortlink_deletion_pipeline_duration_seconds` - Duration of one deletion request
//! - `shortlink_storage_query_duration_seconds` - Postgres query duration
//! - `shortlink_storage_query_timeout_total` - Postgres query timeouts

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Shared state containing the Prometheus handle for metrics rendering.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    describe_metrics();
    Ok(MetricsState::new(handle))
}

fn describe_metrics() {
    metrics::describe_counter!(
        "shortlink_http_requests_total",
        "Total number of HTTP requests"
    );
    metrics::describe_histogram!(
        "shortlink_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    metrics::describe_counter!(
        "shortlink_deletion_requests_total",
        "Deletion requests accepted for background processing"
    );
    metrics::describe_counter!(
        "shortlink_deletion_batches_total",
        "Deletion batches processed, by status"
    );
    metrics::describe_histogram!(
        "shortlink_deletion_pipeline_duration_seconds",
        "Time to process one deletion request, in seconds"
    );
    metrics::describe_histogram!(
        "shortlink_storage_query_duration_seconds",
        "Storage query duration in seconds by operation"
    );
    metrics::describe_counter!(
        "shortlink_storage_query_timeout_total",
        "Storage query timeouts by operation"
    );
}

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for `/metrics`.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}
