//! gRPC server bootstrap.

use std::future::Future;
use std::net::SocketAddr;

use tonic::transport::Server;
use tracing::info;

use shortlink_storage::UrlStore;

use super::service::ShortenerGrpcService;
use crate::proto::shortlink::v1::{shortener_server::ShortenerServer, FILE_DESCRIPTOR_SET};

/// Optional gRPC services.
#[derive(Debug, Clone, Copy)]
pub struct GrpcServerConfig {
    /// Serve `grpc.reflection.v1.ServerReflection`.
    pub reflection_enabled: bool,
    /// Serve `grpc.health.v1.Health`.
    pub health_check_enabled: bool,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            reflection_enabled: true,
            health_check_enabled: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrpcServerError {
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
}

/// Serves `service` on `addr` until `shutdown` resolves.
pub async fn run_grpc_server_with_shutdown<S, F>(
    service: ShortenerGrpcService<S>,
    addr: SocketAddr,
    config: GrpcServerConfig,
    shutdown: F,
) -> Result<(), GrpcServerError>
where
    S: UrlStore,
    F: Future<Output = ()> + Send,
{
    let health = if config.health_check_enabled {
        let (mut reporter, health_service) = tonic_health::server::health_reporter();
        reporter
            .set_serving::<ShortenerServer<ShortenerGrpcService<S>>>()
            .await;
        Some(health_service)
    } else {
        None
    };

    let reflection = if config.reflection_enabled {
        Some(
            tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
                .build_v1()?,
        )
    } else {
        None
    };

    info!(
        %addr,
        reflection = config.reflection_enabled,
        health = config.health_check_enabled,
        "gRPC server listening"
    );

    Server::builder()
        .add_optional_service(health)
        .add_optional_service(reflection)
        .add_service(ShortenerServer::new(service))
        .serve_with_shutdown(addr, shutdown)
        .await?;

    info!("gRPC server stopped");
    Ok(())
}
