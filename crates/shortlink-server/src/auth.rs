//! Signed user tokens.
//!
//! A token is `<user_id>.<hex HMAC-SHA256(user_id)>`. It identifies a user
//! across requests; it is not a login system.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of generated signing keys.
pub const GENERATED_KEY_LENGTH: usize = 32;

/// Errors produced while creating or checking user tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("user token is malformed")]
    Malformed,

    #[error("user token signature does not match")]
    BadSignature,

    #[error("invalid signing key: {message}")]
    InvalidKey { message: String },
}

/// Issues and verifies user tokens with a process-wide key.
#[derive(Clone)]
pub struct UserTokenSigner {
    mac: HmacSha256,
}

impl fmt::Debug for UserTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserTokenSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl UserTokenSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(TokenError::InvalidKey {
                message: "key must not be empty".to_string(),
            });
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|e| TokenError::InvalidKey {
            message: e.to_string(),
        })?;
        Ok(Self { mac })
    }

    /// Creates a signer with a random key. Tokens do not survive a restart.
    pub fn random() -> Result<Self, TokenError> {
        let mut key = [0u8; GENERATED_KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key)
    }

    /// Builds a signer from the configured secret, falling back to a random
    /// key (with a warning) when none is configured.
    pub fn from_secret(secret: Option<&str>) -> Result<Self, TokenError> {
        match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => Self::new(secret.as_bytes()),
            None => {
                warn!(
                    "auth.secret_key is not set; using a random per-process key, \
                     issued user tokens will not survive a restart"
                );
                Self::random()
            }
        }
    }

    /// Generates a fresh user id.
    pub fn new_user_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    pub fn sign(&self, user_id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(user_id.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{user_id}.{signature}")
    }

    /// Returns the user id carried by `token` if its signature is valid.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        let (user_id, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        if user_id.is_empty() {
            return Err(TokenError::Malformed);
        }
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(user_id.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;
        Ok(user_id.to_string())
    }

    /// Creates a new user and the token identifying it.
    pub fn issue(&self) -> (String, String) {
        let user_id = Self::new_user_id();
        let token = self.sign(&user_id);
        (user_id, token)
    }
}
