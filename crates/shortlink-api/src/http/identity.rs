//! User identity extractors.
//!
//! The user token travels in the `user_token` cookie or as
//! `Authorization: Bearer <token>`.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderName,
    },
};
use shortlink_server::UserTokenSigner;
use shortlink_storage::UrlStore;
use tracing::debug;

use super::routes::ApiError;
use super::state::AppState;

/// Name of the cookie carrying the signed user token.
pub const USER_TOKEN_COOKIE: &str = "user_token";

/// Returns the raw token from the cookie or bearer header, cookie first.
fn raw_token(parts: &Parts) -> Option<&str> {
    let from_cookie = parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == USER_TOKEN_COOKIE)
        .map(|(_, value)| value.trim());

    from_cookie.or_else(|| {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
    })
}

fn verified_user(parts: &Parts, signer: &UserTokenSigner) -> Option<String> {
    let token = raw_token(parts)?;
    match signer.verify(token) {
        Ok(user_id) => Some(user_id),
        Err(e) => {
            debug!(error = %e, "ignoring invalid user token");
            None
        }
    }
}

/// The calling user. A new user is issued when the request carries no valid
/// token; the handler must then send [`UserIdentity::set_cookie`] back.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: String,
    issued_token: Option<String>,
}

impl UserIdentity {
    /// `Set-Cookie` header for a newly issued token, if any.
    pub fn set_cookie(&self) -> Option<(HeaderName, String)> {
        self.issued_token.as_ref().map(|token| {
            (
                SET_COOKIE,
                format!("{USER_TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax"),
            )
        })
    }

    pub fn is_new(&self) -> bool {
        self.issued_token.is_some()
    }
}

#[async_trait]
impl<S: UrlStore> FromRequestParts<Arc<AppState<S>>> for UserIdentity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user_id) = verified_user(parts, &state.signer) {
            return Ok(UserIdentity {
                user_id,
                issued_token: None,
            });
        }
        let (user_id, token) = state.signer.issue();
        debug!(user_id = %user_id, "issued new user token");
        Ok(UserIdentity {
            user_id,
            issued_token: Some(token),
        })
    }
}

/// A caller that must already hold a valid token; otherwise 401.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

#[async_trait]
impl<S: UrlStore> FromRequestParts<Arc<AppState<S>>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        verified_user(parts, &state.signer)
            .map(AuthenticatedUser)
            .ok_or_else(|| ApiError::unauthorized("a valid user token is required"))
    }
}
