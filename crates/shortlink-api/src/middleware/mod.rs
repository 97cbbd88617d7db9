//! HTTP middleware.
//!
//! - [`RequestIdLayer`] assigns or propagates `x-request-id`
//! - [`RequestTraceLayer`] wraps each request in a span, logs its outcome and
//!   records request metrics

mod request_id;
mod trace;

pub use request_id::{RequestId, RequestIdLayer, REQUEST_ID_HEADER};
pub use trace::RequestTraceLayer;

#[cfg(test)]
mod tests;
