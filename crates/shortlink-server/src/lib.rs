//! shortlink-server: business logic for the shortlink service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              shortlink-server               │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  auth.rs     - Signed user tokens           │
//! │  handlers/                                  │
//! │    shorten.rs  - Shorten / expand / list    │
//! │    deletion/   - Batched background delete  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod handlers;

pub use auth::{TokenError, UserTokenSigner};
pub use config::{ConfigLoadError, ServerConfig};
pub use handlers::{DeletionQueue, ShortenError, Shortener, UrlDeleter};
