//! PostgreSQL storage implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, instrument};

use crate::error::{HealthStatus, PoolStats, StorageError, StorageResult};
use crate::traits::{is_valid_short_id, validate_record, UrlRecord, UrlStore};

/// Default health check timeout in seconds.
/// Uses a shorter timeout than regular queries since health checks should be fast.
const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default query timeout in seconds.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// PostgreSQL configuration options.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum time to wait for a query before returning `StorageError::QueryTimeout`.
    pub query_timeout_secs: u64,
    /// Timeout for health checks in seconds.
    pub health_check_timeout_secs: u64,
}

// Custom Debug implementation to hide credentials in database_url
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("health_check_timeout_secs", &self.health_check_timeout_secs)
            .finish()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/shortlink".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
        }
    }
}

/// PostgreSQL implementation of UrlStore.
pub struct PostgresUrlStore {
    pool: PgPool,
    query_timeout: Duration,
    health_check_timeout: Duration,
}

fn query_error(context: &str, e: sqlx::Error) -> StorageError {
    StorageError::QueryError {
        message: format!("{context}: {e}"),
    }
}

fn row_to_record(row: PgRow) -> UrlRecord {
    UrlRecord {
        short_id: row.get("short_id"),
        original_url: row.get("original_url"),
        user_id: row.get("user_id"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
    }
}

/// Inserts one record inside a transaction, translating uniqueness
/// violations into the storage error the trait promises.
async fn insert_record(
    tx: &mut Transaction<'_, Postgres>,
    record: &UrlRecord,
) -> StorageResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO urls (short_id, original_url, user_id, is_deleted, created_at)
        VALUES ($1, $2, $3, FALSE, $4)
        ON CONFLICT (original_url) DO NOTHING
        "#,
    )
    .bind(&record.short_id)
    .bind(&record.original_url)
    .bind(&record.user_id)
    .bind(record.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::DuplicateShortId {
            short_id: record.short_id.clone(),
        },
        _ => query_error("failed to insert url", e),
    })?;

    if result.rows_affected() == 0 {
        let existing: (String,) =
            sqlx::query_as("SELECT short_id FROM urls WHERE original_url = $1")
                .bind(&record.original_url)
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| query_error("failed to read conflicting url", e))?;
        return Err(StorageError::UrlConflict {
            original_url: record.original_url.clone(),
            short_id: existing.0,
        });
    }
    Ok(())
}

impl PostgresUrlStore {
    /// Creates a new PostgreSQL store from a connection pool with default timeouts.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            health_check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
        }
    }

    /// Creates a new PostgreSQL store with the given configuration.
    #[instrument(skip(config))]
    pub async fn from_config(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: e.to_string(),
            })?;

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            health_check_timeout: Duration::from_secs(config.health_check_timeout_secs),
        })
    }

    /// Creates a new PostgreSQL store from a database URL.
    pub async fn from_url(database_url: &str) -> StorageResult<Self> {
        let config = PostgresConfig {
            database_url: database_url.to_string(),
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    /// Wraps an async operation with the query timeout and records metrics.
    ///
    /// # Metrics
    /// - `shortlink_storage_query_duration_seconds` - Histogram of query durations
    /// - `shortlink_storage_query_timeout_total` - Counter of timeout events
    async fn execute_with_timeout<T, F>(&self, operation: &str, future: F) -> StorageResult<T>
    where
        F: std::future::Future<Output = StorageResult<T>>,
    {
        let start = Instant::now();
        let result = tokio::time::timeout(self.query_timeout, future).await;
        let duration = start.elapsed().as_secs_f64();

        let (status, final_result) = match result {
            Ok(Ok(value)) => ("success", Ok(value)),
            Ok(Err(e)) => ("error", Err(e)),
            Err(_elapsed) => (
                "timeout",
                Err(StorageError::QueryTimeout {
                    operation: operation.to_string(),
                    timeout: self.query_timeout,
                }),
            ),
        };

        metrics::histogram!(
            "shortlink_storage_query_duration_seconds",
            "operation" => operation.to_string(),
            "backend" => "postgres",
            "status" => status
        )
        .record(duration);

        if status == "timeout" {
            metrics::counter!(
                "shortlink_storage_query_timeout_total",
                "operation" => operation.to_string(),
                "backend" => "postgres"
            )
            .increment(1);
        }

        final_result
    }

    /// Runs database migrations to create required tables.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS urls (
                short_id VARCHAR(64) PRIMARY KEY,
                original_url TEXT NOT NULL,
                user_id VARCHAR(255) NOT NULL,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("failed to create urls table", e))?;

        // idx_urls_original: conflict detection on shorten.
        // idx_urls_user: listing and ownership-scoped deletion.
        let indexes = [
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_urls_original ON urls(original_url)",
            "CREATE INDEX IF NOT EXISTS idx_urls_user ON urls(user_id, created_at)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| query_error("failed to create index", e))?;
        }

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Returns the connection pool for testing or advanced usage.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UrlStore for PostgresUrlStore {
    #[instrument(skip(self, record), fields(short_id = %record.short_id))]
    async fn save_url(&self, record: UrlRecord) -> StorageResult<UrlRecord> {
        validate_record(&record)?;
        self.execute_with_timeout("save_url", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| query_error("failed to begin transaction", e))?;
            insert_record(&mut tx, &record).await?;
            tx.commit()
                .await
                .map_err(|e| query_error("failed to commit transaction", e))?;
            Ok(record)
        })
        .await
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn save_urls(&self, records: Vec<UrlRecord>) -> StorageResult<()> {
        for record in &records {
            validate_record(record)?;
        }
        self.execute_with_timeout("save_urls", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| query_error("failed to begin transaction", e))?;
            for record in &records {
                // Dropping the transaction on error rolls it back.
                insert_record(&mut tx, record).await?;
            }
            tx.commit()
                .await
                .map_err(|e| query_error("failed to commit transaction", e))
        })
        .await
    }

    async fn get_url(&self, short_id: &str) -> StorageResult<UrlRecord> {
        self.execute_with_timeout("get_url", async {
            let row = sqlx::query(
                "SELECT short_id, original_url, user_id, is_deleted, created_at \
                 FROM urls WHERE short_id = $1",
            )
            .bind(short_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("failed to get url", e))?;

            row.map(row_to_record).ok_or_else(|| StorageError::NotFound {
                short_id: short_id.to_string(),
            })
        })
        .await
    }

    async fn get_user_urls(&self, user_id: &str) -> StorageResult<Vec<UrlRecord>> {
        self.execute_with_timeout("get_user_urls", async {
            let rows = sqlx::query(
                "SELECT short_id, original_url, user_id, is_deleted, created_at \
                 FROM urls WHERE user_id = $1 AND NOT is_deleted \
                 ORDER BY created_at, short_id",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error("failed to list user urls", e))?;

            Ok(rows.into_iter().map(row_to_record).collect())
        })
        .await
    }

    #[instrument(skip(self, short_ids), fields(count = short_ids.len()))]
    async fn mark_as_deleted(&self, short_ids: &[String], user_id: &str) -> StorageResult<()> {
        let valid: Vec<String> = short_ids
            .iter()
            .filter(|id| is_valid_short_id(id))
            .cloned()
            .collect();
        if valid.is_empty() {
            return Ok(());
        }

        self.execute_with_timeout("mark_as_deleted", async {
            let result = sqlx::query(
                "UPDATE urls SET is_deleted = TRUE \
                 WHERE user_id = $1 AND short_id = ANY($2) AND NOT is_deleted",
            )
            .bind(user_id)
            .bind(&valid)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error("failed to mark urls as deleted", e))?;

            debug!(updated = result.rows_affected(), "Marked urls as deleted");
            Ok(())
        })
        .await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let start = Instant::now();

        let check_result = tokio::time::timeout(self.health_check_timeout, async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::HealthCheckFailed {
                    message: format!("database ping failed: {e}"),
                })
        })
        .await;

        let latency = start.elapsed();

        match check_result {
            Ok(result) => {
                result?;
            }
            Err(_elapsed) => {
                return Err(StorageError::QueryTimeout {
                    operation: "health_check".to_string(),
                    timeout: self.health_check_timeout,
                });
            }
        }

        // pool.size() returns total connections, so active = size - idle
        let total_connections = self.pool.size();
        let idle_connections = self.pool.num_idle() as u32;
        let active_connections = total_connections.saturating_sub(idle_connections);
        let max_connections = self.pool.options().get_max_connections();

        Ok(HealthStatus {
            healthy: true,
            latency,
            pool_stats: Some(PoolStats {
                active_connections,
                idle_connections,
                max_connections,
            }),
            message: Some("postgresql".to_string()),
        })
    }
}

impl std::fmt::Debug for PostgresUrlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresUrlStore")
            .field("pool", &"PgPool")
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
