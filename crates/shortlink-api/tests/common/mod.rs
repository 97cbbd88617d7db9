//! Shared test utilities for shortlink API tests.

// Each test file compiles this module separately and uses a different subset.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
};

use shortlink_api::http::AppState;
use shortlink_server::handlers::deletion::DeletionConfig;
use shortlink_server::{DeletionQueue, Shortener, UrlDeleter, UserTokenSigner};
use shortlink_storage::UrlStore;

/// Base URL used for short links in tests.
pub const BASE_URL: &str = "http://short.test";

/// Signing key shared by every test signer.
pub const TEST_SIGNING_KEY: &str = "integration-test-key";

/// Upper bound for draining the deletion queue.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn test_signer() -> UserTokenSigner {
    UserTokenSigner::new(TEST_SIGNING_KEY).unwrap()
}

/// Builds a shortener over `store` with the given deletion settings.
pub fn shortener_with<S: UrlStore>(store: Arc<S>, config: DeletionConfig) -> Shortener<S> {
    let deleter = UrlDeleter::new(Arc::clone(&store), config).unwrap();
    Shortener::new(store, DeletionQueue::new(deleter), BASE_URL)
}

pub fn app_state<S: UrlStore>(store: Arc<S>, config: DeletionConfig) -> AppState<S> {
    AppState::new(shortener_with(store, config), test_signer())
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("user_token={token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    body: serde_json::Value,
    token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Short id at the end of a short URL.
pub fn short_id_of(short_url: &str) -> String {
    short_url
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
