//! shortlink-storage: Storage abstraction layer
//!
//! This crate provides the storage abstraction for shortlink, including:
//! - UrlStore trait for storage operations
//! - In-memory implementation for tests and ephemeral deployments
//! - File implementation (append-only JSON lines)
//! - PostgreSQL implementation for production
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             shortlink-storage               │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - UrlStore trait definition    │
//! │  memory.rs   - In-memory implementation     │
//! │  file.rs     - File-backed implementation   │
//! │  postgres.rs - PostgreSQL implementation    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod traits;

// Re-export commonly used types
pub use error::{HealthStatus, PoolStats, StorageError, StorageResult};
pub use file::FileUrlStore;
pub use memory::MemoryUrlStore;
pub use postgres::{PostgresConfig, PostgresUrlStore};
pub use traits::{
    is_valid_short_id, validate_record, validate_short_id, UrlRecord, UrlStore,
    MAX_SHORT_ID_LENGTH, MAX_URL_LENGTH,
};
