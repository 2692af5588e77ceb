//! Delegated-authorization credential lifecycle.
//!
//! The delegated backend (GitHub Copilot) is reached with a short-lived
//! access token minted from a long-lived credential. This module owns that
//! lifecycle:
//!
//! - [`CredentialLifecycleManager`]: acquires, caches, refreshes, and injects
//!   the short-lived token.
//! - [`OAuthCallbackListener`]: the loopback endpoint that completes the
//!   browser-redirect handshake.
//! - [`CredentialStore`]: where the long-lived credential lives.
//! - [`TokenExchanger`]: mints a short-lived token from the long-lived one.
//! - [`InteractiveLogin`]: seam for the browser handshake, implemented by the
//!   `kubeassist-login` crate.

pub mod callback_server;
mod error;
pub mod exchange;
pub mod pkce;
pub mod storage;
pub mod token_manager;

pub use callback_server::CallbackError;
pub use callback_server::CallbackParams;
pub use callback_server::ListenerState;
pub use callback_server::ListenerStatus;
pub use callback_server::OAuthCallbackListener;
pub use error::AuthError;
pub use exchange::CopilotTokenExchanger;
pub use exchange::ExchangeError;
pub use exchange::TokenExchanger;
pub use storage::CredentialStore;
pub use storage::FileCredentialStore;
pub use storage::StoredCredential;
pub use token_manager::CredentialLifecycleManager;
pub use token_manager::TokenStatus;

use std::fmt;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;

/// Refresh is triggered once a token is this close to expiry.
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// A short-lived access token and its wall-clock expiry.
///
/// Replaced wholesale on refresh; the token text never leaves this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }

    /// True when `now` is within [`REFRESH_BUFFER_SECS`] of expiry or past it.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(REFRESH_BUFFER_SECS) <= now
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Runs a browser-based authorization handshake.
#[async_trait]
pub trait InteractiveLogin: Send + Sync {
    /// Completes the handshake and returns the long-lived credential.
    async fn login(&self) -> Result<String, AuthError>;
}
