//! Observability integration tests: request ids and the metrics endpoint.

mod common;

use axum::http::{header, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;

use common::*;
use shortlink_api::http::{create_router, create_router_with_options, RouterOptions};
use shortlink_api::middleware::REQUEST_ID_HEADER;
use shortlink_api::observability::MetricsState;
use shortlink_server::handlers::deletion::DeletionConfig;
use shortlink_storage::MemoryUrlStore;

#[tokio::test]
async fn test_request_id_propagates_through_full_router() {
    let app = create_router(app_state(
        MemoryUrlStore::new_shared(),
        DeletionConfig::default(),
    ));

    let mut request = get("/health");
    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER, "trace-me-123".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(REQUEST_ID_HEADER).unwrap(),
        "trace-me-123"
    );
}

#[tokio::test]
async fn test_metrics_endpoint_renders_prometheus_text() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let metrics_state = MetricsState::new(recorder.handle());
    let app = create_router_with_options(
        app_state(MemoryUrlStore::new_shared(), DeletionConfig::default()),
        RouterOptions::default(),
        Some(metrics_state),
    );

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_metrics_endpoint_absent_when_disabled() {
    let app = create_router(app_state(
        MemoryUrlStore::new_shared(),
        DeletionConfig::default(),
    ));

    // Falls through to the short id route, which has no such id.
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
