//! Configuration management for the shortlink server.
//!
//! Sources, lowest precedence first:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (`SHORTLINK_` prefix, `__` between nested keys)
//!
//! # Example
//!
//! ```ignore
//! use shortlink_server::config::ServerConfig;
//!
//! let config = ServerConfig::load("config.yaml")?;
//! // or, without a file:
//! let config = ServerConfig::from_env()?;
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::handlers::deletion::{DeletionConfig, DEFAULT_BATCH_SIZE, DEFAULT_WORKER_COUNT};

const ENV_PREFIX: &str = "SHORTLINK";

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub grpc: GrpcSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub deletion: DeletionSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix of the short URLs handed out to clients.
    /// Defaults to `http://localhost:<port>`.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerSettings {
    /// The effective base URL for generated short URLs.
    pub fn public_base_url(&self) -> String {
        match self.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://localhost:{}", self.port),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

/// gRPC server settings.
///
/// - `SHORTLINK_GRPC__ENABLED=false` disables the gRPC server entirely
/// - `SHORTLINK_GRPC__PORT=50052` changes the port
/// - `SHORTLINK_GRPC__REFLECTION=false` disables reflection
/// - `SHORTLINK_GRPC__HEALTH_CHECK=false` disables the health service
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GrpcSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_grpc_port")]
    pub port: u16,

    /// Lets clients such as grpcurl discover services without proto files.
    #[serde(default = "default_true")]
    pub reflection: bool,

    /// Standard gRPC health checking protocol.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for GrpcSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_grpc_port(),
            reflection: true,
            health_check: true,
        }
    }
}

fn default_grpc_port() -> u16 {
    50051
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// One of "memory", "file" or "postgres".
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Path of the JSON-lines log (required if backend is "file").
    pub file_path: Option<String>,

    /// Connection URL (required if backend is "postgres").
    pub database_url: Option<String>,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            file_path: None,
            database_url: None,
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

/// Background deletion settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DeletionSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long shutdown waits for in-flight deletions before cancelling them.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for DeletionSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl DeletionSettings {
    pub fn pipeline_config(&self) -> DeletionConfig {
        DeletionConfig::default()
            .with_batch_size(self.batch_size)
            .with_workers(self.workers)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_workers() -> usize {
    DEFAULT_WORKER_COUNT
}

fn default_shutdown_grace() -> u64 {
    10
}

/// User token settings.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AuthSettings {
    /// Key used to sign user tokens. A random per-process key is used when unset.
    pub secret_key: Option<String>,
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field(
                "secret_key",
                &self.secret_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Serve Prometheus metrics on `/metrics`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigLoadError {
    fn invalid(message: impl Into<String>) -> Self {
        ConfigLoadError::Invalid {
            message: message.into(),
        }
    }
}

fn env_source() -> Environment {
    // SHORTLINK_SERVER__PORT -> server.port
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

impl ServerConfig {
    /// Loads a YAML file with environment variable overrides.
    ///
    /// - `SHORTLINK_SERVER__PORT=9090` overrides `server.port`
    /// - `SHORTLINK_STORAGE__DATABASE_URL=...` overrides `storage.database_url`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;
        Ok(server_config)
    }

    /// Loads defaults with `SHORTLINK_` environment overrides only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;
        Ok(server_config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(ConfigLoadError::invalid(
                "server.port must be greater than 0",
            ));
        }
        if self.grpc.enabled && self.grpc.port == 0 {
            return Err(ConfigLoadError::invalid("grpc.port must be greater than 0"));
        }
        if self.grpc.enabled && self.grpc.port == self.server.port {
            return Err(ConfigLoadError::invalid(format!(
                "grpc.port and server.port must differ, both are {}",
                self.server.port
            )));
        }

        let valid_backends = ["memory", "file", "postgres"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::invalid(format!(
                "storage.backend must be one of: {:?}, got: {}",
                valid_backends, self.storage.backend
            )));
        }
        let blank = |value: &Option<String>| value.as_deref().map_or(true, |s| s.trim().is_empty());
        if self.storage.backend == "file" && blank(&self.storage.file_path) {
            return Err(ConfigLoadError::invalid(
                "storage.file_path is required when backend is 'file'",
            ));
        }
        if self.storage.backend == "postgres" && blank(&self.storage.database_url) {
            return Err(ConfigLoadError::invalid(
                "storage.database_url is required when backend is 'postgres'",
            ));
        }

        self.deletion
            .pipeline_config()
            .validate()
            .map_err(|e| ConfigLoadError::invalid(format!("deletion: {e}")))?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}
