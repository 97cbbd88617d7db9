//! Application state for HTTP handlers.

use shortlink_server::{Shortener, UserTokenSigner};
use shortlink_storage::UrlStore;

/// State shared by all HTTP handlers.
pub struct AppState<S: UrlStore> {
    pub shortener: Shortener<S>,
    pub signer: UserTokenSigner,
}

impl<S: UrlStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            shortener: self.shortener.clone(),
            signer: self.signer.clone(),
        }
    }
}

impl<S: UrlStore> AppState<S> {
    pub fn new(shortener: Shortener<S>, signer: UserTokenSigner) -> Self {
        Self { shortener, signer }
    }
}
