use axum::{
    body::Body,
    extract::Path,
    http::{Request, StatusCode},
    routing::get,
    Extension, Router,
};
use tower::ServiceExt;

use super::*;
use crate::observability::{create_json_layer, CaptureWriter};

/// Same layering as the real router: ids outermost, tracing on matched routes.
fn test_app() -> Router {
    Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/items/:id", get(|Path(id): Path<String>| async move { id }))
        .route(
            "/whoami",
            get(|Extension(id): Extension<RequestId>| async move { id.0 }),
        )
        .route("/boom", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route_layer(RequestTraceLayer::new())
        .layer(RequestIdLayer::new())
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let response = test_app().oneshot(get_request("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
    assert_eq!(id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let request = Request::builder()
        .uri("/whoami")
        .header(REQUEST_ID_HEADER, "req-123")
        .body(Body::empty())
        .unwrap();

    let response = test_app().oneshot(request).await.unwrap();

    assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-123");
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"req-123");
}

#[tokio::test]
async fn test_oversized_request_id_is_replaced() {
    let request = Request::builder()
        .uri("/")
        .header(REQUEST_ID_HEADER, "x".repeat(500))
        .body(Body::empty())
        .unwrap();

    let response = test_app().oneshot(request).await.unwrap();

    let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
    assert_eq!(id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_completed_request_is_logged_with_route() {
    let writer = CaptureWriter::default();
    let _guard = tracing::subscriber::set_default(create_json_layer(writer.clone()));

    let request = Request::builder()
        .uri("/items/abc123")
        .header(REQUEST_ID_HEADER, "req-log")
        .body(Body::empty())
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = writer.events();
    let completed = events
        .iter()
        .find(|e| e["fields"]["message"] == "request completed")
        .expect("completion should be logged");
    assert_eq!(completed["level"], "INFO");
    assert_eq!(completed["fields"]["status"], 200);
    assert_eq!(completed["fields"]["uri"], "/items/abc123");
    assert_eq!(completed["span"]["route"], "/items/:id");
    assert_eq!(completed["span"]["request_id"], "req-log");
}

#[tokio::test]
async fn test_server_errors_are_logged_as_warnings() {
    let writer = CaptureWriter::default();
    let _guard = tracing::subscriber::set_default(create_json_layer(writer.clone()));

    let response = test_app().oneshot(get_request("/boom")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let events = writer.events();
    let failed = events
        .iter()
        .find(|e| e["fields"]["message"] == "request failed")
        .expect("failure should be logged");
    assert_eq!(failed["level"], "WARN");
    assert_eq!(failed["fields"]["status"], 500);
}

#[test]
fn test_status_classes() {
    assert_eq!(trace::status_class(204), "2xx");
    assert_eq!(trace::status_class(307), "3xx");
    assert_eq!(trace::status_class(410), "4xx");
    assert_eq!(trace::status_class(503), "5xx");
    assert_eq!(trace::status_class(101), "other");
}
