//! Per-request span, completion log and metrics.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use axum::{
    extract::MatchedPath,
    http::{Request, Response},
};
use tower::{Layer, Service};
use tracing::{field::Empty, info, info_span, warn, Instrument, Span};

use super::request_id::RequestId;

/// Layer that traces and measures HTTP requests.
///
/// Place it inside [`super::RequestIdLayer`] so the request id is available.
#[derive(Clone, Default)]
pub struct RequestTraceLayer;

impl RequestTraceLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestTraceLayer {
    type Service = RequestTraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTraceService { inner }
    }
}

#[derive(Clone)]
pub struct RequestTraceService<S> {
    inner: S,
}

pub(super) fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestTraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let method = request.method().clone();
        let uri = request.uri().clone();
        // Route template keeps metric cardinality bounded ("/:short_id", not every id).
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "unmatched".to_string());
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();

        let span = info_span!(
            "http_request",
            method = %method,
            route = %route,
            request_id = %request_id,
            status = Empty,
        );

        let start = Instant::now();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let response = inner.call(request).await?;
                let elapsed = start.elapsed();
                let status = response.status().as_u16();
                Span::current().record("status", status);

                let class = status_class(status);
                let labels = [
                    ("method", method.to_string()),
                    ("path", route),
                    ("status_class", class.to_string()),
                ];
                metrics::counter!("shortlink_http_requests_total", &labels).increment(1);
                metrics::histogram!("shortlink_http_request_duration_seconds", &labels)
                    .record(elapsed.as_secs_f64());

                if status >= 500 {
                    warn!(
                        target: "shortlink::http",
                        uri = %uri,
                        status,
                        duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        "request failed"
                    );
                } else {
                    info!(
                        target: "shortlink::http",
                        uri = %uri,
                        status,
                        duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        "request completed"
                    );
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}
