//! HTTP REST API.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/` | POST | Shorten a plain-text URL |
//! | `/api/shorten` | POST | Shorten `{"url"}` |
//! | `/api/shorten/batch` | POST | Shorten many URLs at once |
//! | `/{short_id}` | GET | Redirect (307), or 410 once deleted |
//! | `/api/user/urls` | GET | The caller's URLs |
//! | `/api/user/urls` | DELETE | Delete the caller's URLs in the background (202) |
//! | `/ping` | GET | Storage health |
//! | `/health` | GET | Liveness |
//! | `/metrics` | GET | Prometheus metrics (when enabled) |

pub mod identity;
pub mod routes;
pub mod state;

pub use identity::{AuthenticatedUser, UserIdentity, USER_TOKEN_COOKIE};
pub use routes::{
    create_router, create_router_with_options, ApiError, RouterOptions, DEFAULT_BODY_LIMIT,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use state::AppState;

#[cfg(test)]
mod tests;
