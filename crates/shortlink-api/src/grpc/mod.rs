//! gRPC API.
//!
//! ```text
//! gRPC Request → ShortenerGrpcService → Shortener → UrlStore
//! ```
//!
//! The service mirrors the HTTP API. Callers are identified by the
//! `user-token` metadata entry.

mod server;
mod service;

pub use server::{run_grpc_server_with_shutdown, GrpcServerConfig, GrpcServerError};
pub use service::{ShortenerGrpcService, SHORT_URL_METADATA, USER_TOKEN_METADATA};

// Re-export the generated server type for service registration
pub use crate::proto::shortlink::v1::shortener_server::ShortenerServer;
