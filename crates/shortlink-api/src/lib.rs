//! shortlink-api: HTTP and gRPC API layer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                shortlink-api                │
//! ├─────────────────────────────────────────────┤
//! │  http/          - REST endpoints (axum)     │
//! │  grpc/          - gRPC service (tonic)      │
//! │  middleware/    - Request id, tracing       │
//! │  observability/ - Logging, Prometheus       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod errors;
pub mod grpc;
pub mod http;
pub mod middleware;
pub mod observability;

/// Generated protobuf types and service traits.
pub mod proto {
    pub mod shortlink {
        pub mod v1 {
            tonic::include_proto!("shortlink.v1");

            /// Encoded descriptors for the reflection service.
            pub const FILE_DESCRIPTOR_SET: &[u8] =
                tonic::include_file_descriptor_set!("shortlink_descriptor");
        }
    }
}
