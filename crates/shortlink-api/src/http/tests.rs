//! HTTP API tests.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    routing::get as get_route,
    Router,
};
use tower::ServiceExt; // for oneshot
use tower_http::compression::CompressionLayer;

use shortlink_server::handlers::deletion::DeletionConfig;
use shortlink_server::{DeletionQueue, Shortener, UrlDeleter, UserTokenSigner};
use shortlink_storage::{
    HealthStatus, MemoryUrlStore, StorageError, StorageResult, UrlRecord, UrlStore,
};

use super::routes::create_router;
use super::state::AppState;

const BASE_URL: &str = "http://short.test";

fn test_state() -> (AppState<MemoryUrlStore>, Arc<MemoryUrlStore>) {
    let store = MemoryUrlStore::new_shared();
    let deleter = UrlDeleter::new(Arc::clone(&store), DeletionConfig::default()).unwrap();
    let shortener = Shortener::new(Arc::clone(&store), DeletionQueue::new(deleter), BASE_URL);
    let signer = UserTokenSigner::new("test-signing-key").unwrap();
    (AppState::new(shortener, signer), store)
}

fn test_app() -> Router {
    create_router(test_state().0)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_text(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_cookie(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::COOKIE,
        format!("user_token={token}").parse().unwrap(),
    );
    request
}

async fn body_text(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Token value from a `Set-Cookie: user_token=...` header.
fn issued_token(response: &Response) -> String {
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie header")
        .to_str()
        .unwrap();
    cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("user_token="))
        .unwrap()
        .to_string()
}

fn short_id_of(short_url: &str) -> &str {
    short_url.strip_prefix(&format!("{BASE_URL}/")).unwrap()
}

#[tokio::test]
async fn test_health_returns_ok() {
    let response = test_app().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_ping_returns_200_for_healthy_storage() {
    let response = test_app().oneshot(get("/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Store whose backend is unreachable.
struct UnreachableStore;

#[async_trait]
impl UrlStore for UnreachableStore {
    async fn save_url(&self, record: UrlRecord) -> StorageResult<UrlRecord> {
        Ok(record)
    }

    async fn save_urls(&self, _records: Vec<UrlRecord>) -> StorageResult<()> {
        Ok(())
    }

    async fn get_url(&self, short_id: &str) -> StorageResult<UrlRecord> {
        Err(StorageError::NotFound {
            short_id: short_id.to_string(),
        })
    }

    async fn get_user_urls(&self, _user_id: &str) -> StorageResult<Vec<UrlRecord>> {
        Ok(Vec::new())
    }

    async fn mark_as_deleted(&self, _short_ids: &[String], _user_id: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Err(StorageError::ConnectionError {
            message: "connection refused".to_string(),
        })
    }
}

#[tokio::test]
async fn test_ping_returns_500_for_unreachable_storage() {
    let store = Arc::new(UnreachableStore);
    let deleter = UrlDeleter::new(Arc::clone(&store), DeletionConfig::default()).unwrap();
    let shortener = Shortener::new(store, DeletionQueue::new(deleter), BASE_URL);
    let state = AppState::new(shortener, UserTokenSigner::new("test-signing-key").unwrap());

    let response = create_router(state).oneshot(get("/ping")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

/// Gzip-compresses `payload` by serving it through the compression layer.
async fn gzip(payload: String) -> Vec<u8> {
    let encoder = Router::new()
        .route(
            "/",
            get_route(move || {
                let payload = payload.clone();
                async move { payload }
            }),
        )
        .layer(CompressionLayer::new());
    let request = Request::builder()
        .uri("/")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();

    let response = encoder.oneshot(request).await.unwrap();
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_gzip_request_and_response() {
    let body = serde_json::json!({ "url": "https://example.com/compressed/request/body" });
    let compressed = gzip(body.to_string()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/shorten")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::from(compressed))
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
}

#[tokio::test]
async fn test_batch_with_repeated_url_returns_400() {
    let response = test_app()
        .oneshot(json_request(
            "POST",
            "/api/shorten/batch",
            serde_json::json!([
                { "correlation_id": "1", "original_url": "https://dup.example" },
                { "correlation_id": "2", "original_url": "https://dup.example" },
            ]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_shorten_text_returns_201_and_issues_token() {
    let response = test_app()
        .oneshot(post_text("/", "https://example.com/a"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = response.headers().get(header::SET_COOKIE).unwrap();
    assert!(cookie.to_str().unwrap().contains("HttpOnly"));

    let short_url = body_text(response).await;
    assert!(short_url.starts_with("http://short.test/"));
    assert_eq!(short_id_of(&short_url).len(), 8);
}

#[tokio::test]
async fn test_known_token_is_not_reissued() {
    let (state, _) = test_state();
    let token = state.signer.sign("user-1");
    let app = create_router(state);

    let response = app
        .oneshot(with_cookie(post_text("/", "https://example.com/a"), &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_shorten_same_url_twice_returns_409_with_existing_url() {
    let app = test_app();

    let first = app
        .clone()
        .oneshot(post_text("/", "https://example.com/dup"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_url = body_text(first).await;

    let second = app
        .oneshot(post_text("/", "https://example.com/dup"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_text(second).await, first_url);
}

#[tokio::test]
async fn test_shorten_text_rejects_invalid_url() {
    let response = test_app()
        .oneshot(post_text("/", "not a url"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "validation_error");
}

#[tokio::test]
async fn test_shorten_json_returns_result() {
    let response = test_app()
        .oneshot(json_request(
            "POST",
            "/api/shorten",
            serde_json::json!({ "url": "https://example.com/json" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert!(json["result"]
        .as_str()
        .unwrap()
        .starts_with("http://short.test/"));
}

#[tokio::test]
async fn test_shorten_json_conflict_returns_existing_result() {
    let app = test_app();
    let body = serde_json::json!({ "url": "https://example.com/json-dup" });

    let first = app
        .clone()
        .oneshot(json_request("POST", "/api/shorten", body.clone()))
        .await
        .unwrap();
    let first_result = body_json(first).await["result"].clone();

    let second = app
        .oneshot(json_request("POST", "/api/shorten", body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["result"], first_result);
}

#[tokio::test]
async fn test_malformed_json_returns_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/shorten")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"url\":"))
        .unwrap();

    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_body_returns_413() {
    let url = format!("https://example.com/{}", "a".repeat(super::DEFAULT_BODY_LIMIT));
    let response = test_app()
        .oneshot(json_request(
            "POST",
            "/api/shorten",
            serde_json::json!({ "url": url }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_batch_shorten_keeps_correlation_ids() {
    let response = test_app()
        .oneshot(json_request(
            "POST",
            "/api/shorten/batch",
            serde_json::json!([
                { "correlation_id": "a", "original_url": "https://example.com/1" },
                { "correlation_id": "b", "original_url": "https://example.com/2" },
            ]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["correlation_id"], "a");
    assert_eq!(results[1]["correlation_id"], "b");
    assert_ne!(results[0]["short_url"], results[1]["short_url"]);
}

#[tokio::test]
async fn test_empty_batch_returns_400() {
    let response = test_app()
        .oneshot(json_request(
            "POST",
            "/api/shorten/batch",
            serde_json::json!([]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_redirect_returns_307_with_location() {
    let (state, store) = test_state();
    store
        .save_url(UrlRecord::new("abc123", "https://example.com/target", "u1"))
        .await
        .unwrap();

    let response = create_router(state).oneshot(get("/abc123")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://example.com/target"
    );
}

#[tokio::test]
async fn test_unknown_short_id_returns_404() {
    let response = test_app().oneshot(get("/missing1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "not_found");
}

#[tokio::test]
async fn test_deleted_short_id_returns_410() {
    let (state, store) = test_state();
    store
        .save_url(UrlRecord::new("gone1", "https://example.com/old", "u1"))
        .await
        .unwrap();
    store
        .mark_as_deleted(&["gone1".to_string()], "u1")
        .await
        .unwrap();

    let response = create_router(state).oneshot(get("/gone1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_user_urls_without_token_returns_401() {
    let response = test_app().oneshot(get("/api/user/urls")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "unauthorized");
}

#[tokio::test]
async fn test_user_urls_with_forged_token_returns_401() {
    let forged = UserTokenSigner::new("some-other-key").unwrap().sign("user-1");
    let response = test_app()
        .oneshot(with_cookie(get("/api/user/urls"), &forged))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_urls_empty_returns_204() {
    let (state, _) = test_state();
    let token = state.signer.sign("nobody");

    let response = create_router(state)
        .oneshot(with_cookie(get("/api/user/urls"), &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_user_urls_lists_own_urls_via_cookie() {
    let app = test_app();

    let created = app
        .clone()
        .oneshot(post_text("/", "https://example.com/mine"))
        .await
        .unwrap();
    let token = issued_token(&created);
    let short_url = body_text(created).await;

    let response = app
        .oneshot(with_cookie(get("/api/user/urls"), &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(
        json,
        serde_json::json!([
            { "short_url": short_url, "original_url": "https://example.com/mine" }
        ])
    );
}

#[tokio::test]
async fn test_user_urls_accepts_bearer_token() {
    let (state, store) = test_state();
    let token = state.signer.sign("bearer-user");
    store
        .save_url(UrlRecord::new("bear1", "https://example.com/b", "bearer-user"))
        .await
        .unwrap();

    let request = Request::builder()
        .uri("/api/user/urls")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = create_router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json[0]["short_url"], "http://short.test/bear1");
}

#[tokio::test]
async fn test_delete_returns_202_and_urls_become_gone() {
    let (state, store) = test_state();
    let shortener = state.shortener.clone();
    let token = state.signer.sign("owner");
    for id in ["del1", "del2"] {
        store
            .save_url(UrlRecord::new(id, format!("https://example.com/{id}"), "owner"))
            .await
            .unwrap();
    }
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(with_cookie(
            json_request("DELETE", "/api/user/urls", serde_json::json!(["del1", "del2"])),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert!(shortener.deletions().shutdown(Duration::from_secs(5)).await);

    for id in ["del1", "del2"] {
        let response = app.clone().oneshot(get(&format!("/{id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
    }
}

#[tokio::test]
async fn test_delete_by_other_user_leaves_urls_alone() {
    let (state, store) = test_state();
    let shortener = state.shortener.clone();
    let intruder = state.signer.sign("intruder");
    store
        .save_url(UrlRecord::new("keep1", "https://example.com/keep", "owner"))
        .await
        .unwrap();
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(with_cookie(
            json_request("DELETE", "/api/user/urls", serde_json::json!(["keep1"])),
            &intruder,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(shortener.deletions().shutdown(Duration::from_secs(5)).await);

    let response = app.oneshot(get("/keep1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_delete_after_shutdown_returns_503() {
    let (state, _) = test_state();
    let token = state.signer.sign("late");
    state
        .shortener
        .deletions()
        .shutdown(Duration::from_secs(1))
        .await;

    let response = create_router(state)
        .oneshot(with_cookie(
            json_request("DELETE", "/api/user/urls", serde_json::json!(["x1"])),
            &token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let response = test_app().oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
