//! HTTP route definitions and handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRequest, Path, Request, State},
    http::StatusCode,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer, decompression::RequestDecompressionLayer,
    limit::RequestBodyLimitLayer, timeout::TimeoutLayer,
};
use tracing::{error, info};

use shortlink_server::handlers::shorten::{BatchItem, ShortenError};
use shortlink_storage::UrlStore;

use super::identity::{AuthenticatedUser, UserIdentity};
use super::state::AppState;
use crate::errors::{classify, ErrorKind};
use crate::middleware::{RequestIdLayer, RequestTraceLayer};
use crate::observability::{metrics_handler, MetricsState};

/// JSON extractor that answers 400 instead of axum's 422 for bodies that do
/// not deserialize. Body-limit failures stay 413.
pub struct JsonBadRequest<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBadRequest<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBadRequest(value)),
            Err(rejection) => {
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    Err(ApiError::new(
                        error_codes::PAYLOAD_TOO_LARGE,
                        rejection.body_text(),
                    ))
                } else {
                    Err(ApiError::validation_error(rejection.body_text()))
                }
            }
        }
    }
}

/// Default request body size limit (1MB).
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Router-wide limits.
#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    pub body_limit: usize,
    pub request_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            body_limit: DEFAULT_BODY_LIMIT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

fn api_routes<S: UrlStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/", post(shorten_text::<S>))
        .route("/api/shorten", post(shorten_json::<S>))
        .route("/api/shorten/batch", post(shorten_batch::<S>))
        .route(
            "/api/user/urls",
            get(list_user_urls::<S>).delete(delete_user_urls::<S>),
        )
        .route("/ping", get(ping::<S>))
        .route("/health", get(health_check))
        .route("/:short_id", get(redirect::<S>))
}

/// Creates the router with default limits and no `/metrics` endpoint.
pub fn create_router<S: UrlStore>(state: AppState<S>) -> Router {
    create_router_with_options(state, RouterOptions::default(), None)
}

/// Creates the router.
///
/// `/metrics` is served only when `metrics_state` is given.
pub fn create_router_with_options<S: UrlStore>(
    state: AppState<S>,
    options: RouterOptions,
    metrics_state: Option<MetricsState>,
) -> Router {
    let mut router = api_routes::<S>().with_state(Arc::new(state));

    if let Some(metrics_state) = metrics_state {
        router = router.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(metrics_state),
        );
    }

    // Last .layer() is outermost.
    router
        .route_layer(RequestTraceLayer::new())
        .layer(RequestBodyLimitLayer::new(options.body_limit))
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(RequestIdLayer::new())
}

// ============================================================
// Error Handling
// ============================================================

pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NOT_FOUND: &str = "not_found";
    pub const GONE: &str = "gone";
    pub const CONFLICT: &str = "conflict";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const SERVICE_UNAVAILABLE: &str = "service_unavailable";
    pub const TIMEOUT: &str = "timeout";
}

/// JSON error body: `{"code": "...", "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::VALIDATION_ERROR, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(error_codes::UNAUTHORIZED, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        use error_codes::*;

        match self.code.as_str() {
            VALIDATION_ERROR => StatusCode::BAD_REQUEST,
            UNAUTHORIZED => StatusCode::UNAUTHORIZED,
            NOT_FOUND => StatusCode::NOT_FOUND,
            GONE => StatusCode::GONE,
            CONFLICT => StatusCode::CONFLICT,
            PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            SERVICE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            TIMEOUT => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ShortenError> for ApiError {
    fn from(err: ShortenError) -> Self {
        match classify(&err) {
            ErrorKind::InvalidInput(message) => ApiError::validation_error(message),
            ErrorKind::Conflict { short_id } => ApiError::new(
                error_codes::CONFLICT,
                format!("URL is already shortened as {short_id}"),
            ),
            ErrorKind::NotFound(message) => ApiError::new(error_codes::NOT_FOUND, message),
            ErrorKind::Gone(message) => ApiError::new(error_codes::GONE, message),
            ErrorKind::Unavailable(message) => {
                ApiError::new(error_codes::SERVICE_UNAVAILABLE, message)
            }
            ErrorKind::Timeout(message) => ApiError::new(error_codes::TIMEOUT, message),
            ErrorKind::Internal(message) => ApiError::internal_error(message),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================
// Health
// ============================================================

/// Liveness probe. Does not touch storage.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Storage connectivity check: 200 when healthy, 500 otherwise.
async fn ping<S: UrlStore>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse {
    match state.shortener.ping().await {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(e) => {
            error!(error = %e, "storage ping failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
        }
    }
}

// ============================================================
// Shortening
// ============================================================

/// `POST /` with the URL as plain text.
async fn shorten_text<S: UrlStore>(
    State(state): State<Arc<AppState<S>>>,
    identity: UserIdentity,
    body: String,
) -> ApiResult<Response> {
    let cookie = AppendHeaders(identity.set_cookie());
    match state.shortener.shorten(&body, &identity.user_id).await {
        Ok(short_id) => {
            let short_url = state.shortener.short_url(&short_id);
            Ok((StatusCode::CREATED, cookie, short_url).into_response())
        }
        Err(ShortenError::Conflict { short_id }) => {
            let short_url = state.shortener.short_url(&short_id);
            Ok((StatusCode::CONFLICT, cookie, short_url).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ShortenRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenResponse {
    pub result: String,
}

/// `POST /api/shorten` with `{"url": "..."}`.
async fn shorten_json<S: UrlStore>(
    State(state): State<Arc<AppState<S>>>,
    identity: UserIdentity,
    JsonBadRequest(body): JsonBadRequest<ShortenRequest>,
) -> ApiResult<Response> {
    let cookie = AppendHeaders(identity.set_cookie());
    let (status, short_id) = match state.shortener.shorten(&body.url, &identity.user_id).await {
        Ok(short_id) => (StatusCode::CREATED, short_id),
        Err(ShortenError::Conflict { short_id }) => (StatusCode::CONFLICT, short_id),
        Err(e) => return Err(e.into()),
    };
    let response = ShortenResponse {
        result: state.shortener.short_url(&short_id),
    };
    Ok((status, cookie, Json(response)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct BatchShortenItem {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchShortenResult {
    pub correlation_id: String,
    pub short_url: String,
}

/// `POST /api/shorten/batch`: all items are shortened or none.
async fn shorten_batch<S: UrlStore>(
    State(state): State<Arc<AppState<S>>>,
    identity: UserIdentity,
    JsonBadRequest(body): JsonBadRequest<Vec<BatchShortenItem>>,
) -> ApiResult<Response> {
    let items = body
        .into_iter()
        .map(|item| BatchItem {
            correlation_id: item.correlation_id,
            original_url: item.original_url,
        })
        .collect();

    let shortened = state
        .shortener
        .shorten_batch(items, &identity.user_id)
        .await?;
    let results: Vec<BatchShortenResult> = shortened
        .into_iter()
        .map(|s| BatchShortenResult {
            short_url: state.shortener.short_url(&s.short_id),
            correlation_id: s.correlation_id,
        })
        .collect();

    Ok((
        StatusCode::CREATED,
        AppendHeaders(identity.set_cookie()),
        Json(results),
    )
        .into_response())
}

/// `GET /:short_id`: 307 to the original URL, 410 once deleted.
async fn redirect<S: UrlStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(short_id): Path<String>,
) -> ApiResult<Redirect> {
    let original_url = state.shortener.expand(&short_id).await?;
    Ok(Redirect::temporary(&original_url))
}

// ============================================================
// Per-user URLs
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct UserUrlResponse {
    pub short_url: String,
    pub original_url: String,
}

/// `GET /api/user/urls`: 204 when the user has no live URLs.
async fn list_user_urls<S: UrlStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> ApiResult<Response> {
    let records = state.shortener.user_urls(&user_id).await?;
    if records.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let urls: Vec<UserUrlResponse> = records
        .into_iter()
        .map(|record| UserUrlResponse {
            short_url: state.shortener.short_url(&record.short_id),
            original_url: record.original_url,
        })
        .collect();
    Ok(Json(urls).into_response())
}

/// `DELETE /api/user/urls` with a JSON array of short ids.
///
/// Answers 202 as soon as the deletion is queued; the outcome is only logged.
async fn delete_user_urls<S: UrlStore>(
    State(state): State<Arc<AppState<S>>>,
    identity: UserIdentity,
    JsonBadRequest(short_ids): JsonBadRequest<Vec<String>>,
) -> ApiResult<Response> {
    let count = short_ids.len();
    state
        .shortener
        .delete_urls(&identity.user_id, short_ids)?;
    info!(user_id = %identity.user_id, count, "deletion accepted");

    Ok((StatusCode::ACCEPTED, AppendHeaders(identity.set_cookie())).into_response())
}
