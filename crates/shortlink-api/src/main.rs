//! shortlink server binary.
//!
//! Serves the HTTP and gRPC APIs over one storage backend.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! shortlink --config config.yaml
//!
//! # With environment variables only
//! SHORTLINK_STORAGE__BACKEND=memory shortlink
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use shortlink_api::grpc::{run_grpc_server_with_shutdown, GrpcServerConfig, ShortenerGrpcService};
use shortlink_api::http::{create_router_with_options, AppState, RouterOptions};
use shortlink_api::observability::{
    init_logging, init_metrics, parse_log_level, LoggingConfig, MetricsState,
};
use shortlink_server::{DeletionQueue, ServerConfig, Shortener, UrlDeleter, UserTokenSigner};
use shortlink_storage::{FileUrlStore, MemoryUrlStore, PostgresConfig, PostgresUrlStore, UrlStore};

/// shortlink - URL shortener with batched background deletion
#[derive(Parser, Debug)]
#[command(name = "shortlink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = args.config {
        ServerConfig::load(&config_path)?
    } else {
        ServerConfig::from_env()?
    };

    init_logging(LoggingConfig {
        json_format: config.logging.json,
        default_level: parse_log_level(&config.logging.level),
    });

    info!(version = env!("CARGO_PKG_VERSION"), "Starting shortlink server");

    let metrics_state = if config.metrics.enabled {
        let state = init_metrics()?;
        info!("Metrics enabled at /metrics");
        Some(state)
    } else {
        None
    };

    let http_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let grpc_addr: SocketAddr = format!("{}:{}", config.server.host, config.grpc.port).parse()?;

    match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory storage backend");
            let storage = MemoryUrlStore::new_shared();
            run_servers(storage, http_addr, grpc_addr, &config, metrics_state).await
        }
        "file" => {
            let path = config.storage.file_path.as_deref().ok_or_else(|| {
                anyhow::anyhow!("storage.file_path is required for file backend")
            })?;

            info!(path, "Using file storage backend");
            let storage = Arc::new(FileUrlStore::open(path).await?);
            run_servers(storage, http_addr, grpc_addr, &config, metrics_state).await
        }
        "postgres" => {
            let database_url = config.storage.database_url.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.database_url is required for postgres backend")
            })?;

            info!("Connecting to PostgreSQL database");
            let pg_config = PostgresConfig {
                database_url: database_url.clone(),
                max_connections: config.storage.pool_size,
                min_connections: 1,
                connect_timeout_secs: config.storage.connection_timeout_secs,
                ..Default::default()
            };

            let storage = PostgresUrlStore::from_config(&pg_config).await?;
            info!("PostgreSQL connection established");

            info!("Running database migrations");
            storage.run_migrations().await?;
            info!("Database migrations complete");

            run_servers(Arc::new(storage), http_addr, grpc_addr, &config, metrics_state).await
        }
        _ => {
            error!("Unknown storage backend: {}", config.storage.backend);
            anyhow::bail!("Unknown storage backend: {}", config.storage.backend);
        }
    }
}

/// Runs both servers over `storage`, then drains pending deletions.
///
/// Uses `tokio::select!` to race server futures against the shutdown signal,
/// so a server that fails to start stops the other one too.
async fn run_servers<S: UrlStore>(
    storage: Arc<S>,
    http_addr: SocketAddr,
    grpc_addr: SocketAddr,
    config: &ServerConfig,
    metrics_state: Option<MetricsState>,
) -> anyhow::Result<()> {
    let deleter = UrlDeleter::new(Arc::clone(&storage), config.deletion.pipeline_config())?;
    info!(
        batch_size = config.deletion.batch_size,
        workers = config.deletion.workers,
        "Deletion pipeline configured"
    );
    let deletions = DeletionQueue::new(deleter);
    let shortener = Shortener::new(
        storage,
        deletions.clone(),
        config.server.public_base_url(),
    );
    let signer = UserTokenSigner::from_secret(config.auth.secret_key.as_deref())?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_shutdown_rx = shutdown_tx.subscribe();
    let options = RouterOptions {
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        ..Default::default()
    };
    let router = create_router_with_options(
        AppState::new(shortener.clone(), signer.clone()),
        options,
        metrics_state,
    );
    let http_future = run_http_server(router, http_addr, http_shutdown_rx);

    let grpc_future = if config.grpc.enabled {
        let grpc_config = GrpcServerConfig {
            reflection_enabled: config.grpc.reflection,
            health_check_enabled: config.grpc.health_check,
        };
        let service = ShortenerGrpcService::new(shortener, signer);
        let mut grpc_shutdown_rx = shutdown_tx.subscribe();

        info!(%grpc_addr, "gRPC server enabled");

        Some(async move {
            let shutdown_future = async move {
                let _ = grpc_shutdown_rx.recv().await;
            };
            run_grpc_server_with_shutdown(service, grpc_addr, grpc_config, shutdown_future)
                .await
                .map_err(|e| anyhow::anyhow!("gRPC server error: {}", e))
        })
    } else {
        info!("gRPC server disabled");
        None
    };

    let result =
        supervise_servers(http_future, grpc_future, &shutdown_tx, shutdown_signal()).await;

    let grace = config.deletion.shutdown_grace();
    info!(in_flight = deletions.in_flight(), ?grace, "Draining pending deletions");
    if !deletions.shutdown(grace).await {
        warn!("Pending deletions were cancelled after the grace period");
    }

    info!("All servers shutdown complete");
    result
}

/// Drives both servers until they stop.
///
/// A server that exits (cleanly or not) or `signal` firing broadcasts
/// shutdown; the servers are then awaited so in-flight requests drain.
async fn supervise_servers<H, G, Sig>(
    http: H,
    grpc: Option<G>,
    shutdown_tx: &broadcast::Sender<()>,
    signal: Sig,
) -> anyhow::Result<()>
where
    H: Future<Output = anyhow::Result<()>>,
    G: Future<Output = anyhow::Result<()>>,
    Sig: Future<Output = ()>,
{
    let http = async {
        let result = http.await;
        if let Err(ref e) = result {
            error!("HTTP server error: {}", e);
        }
        let _ = shutdown_tx.send(());
        result
    };
    let grpc = async {
        let Some(grpc) = grpc else {
            return Ok(());
        };
        let result = grpc.await;
        if let Err(ref e) = result {
            error!("gRPC server error: {}", e);
        }
        let _ = shutdown_tx.send(());
        result
    };

    let servers = async {
        let (http_result, grpc_result) = tokio::join!(http, grpc);
        http_result.and(grpc_result)
    };
    tokio::pin!(servers);

    tokio::select! {
        result = &mut servers => result,
        _ = signal => {
            info!("Shutdown signal received, stopping servers");
            let _ = shutdown_tx.send(());
            servers.await
        }
    }
}

/// Runs the HTTP server with graceful shutdown.
async fn run_http_server(
    router: axum::Router,
    addr: SocketAddr,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    info!(%addr, "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("HTTP server received shutdown signal");
        })
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
