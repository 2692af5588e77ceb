//! Owns the short-lived Copilot token and its transitions.
//!
//! ```text
//! NoToken --acquire--> Valid --near expiry--> Refreshing --ok--> Valid
//!    ^                                            |
//!    +------------- Invalid <-------failure-------+
//! ```
//!
//! The state lives behind one async mutex that is held across the whole
//! acquire/refresh step, so overlapping [`CredentialLifecycleManager::ensure_token`]
//! calls queue behind a single exchange and then observe its result.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use reqwest::RequestBuilder;
use tokio::sync::Mutex;
use tracing::info;
use tracing::warn;

use super::AuthError;
use super::InteractiveLogin;
use super::TokenRecord;
use super::exchange::COPILOT_INTEGRATION_ID;
use super::exchange::EDITOR_PLUGIN_VERSION;
use super::exchange::EDITOR_VERSION;
use super::exchange::TokenExchanger;
use super::storage::CredentialStore;
use super::storage::StoredCredential;

const USER_AGENT: &str = concat!("kubeassist/", env!("CARGO_PKG_VERSION"));

enum TokenState {
    NoToken,
    Valid(TokenRecord),
    Invalid,
}

/// Externally observable manager state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    NoToken,
    Valid { expires_at: DateTime<Utc> },
    Refreshing,
    Invalid,
}

pub struct CredentialLifecycleManager {
    state: Mutex<TokenState>,
    store: Arc<dyn CredentialStore>,
    exchanger: Arc<dyn TokenExchanger>,
    login: Option<Arc<dyn InteractiveLogin>>,
    interactive_on_demand: bool,
    login_guard: Mutex<()>,
}

impl CredentialLifecycleManager {
    pub fn new(store: Arc<dyn CredentialStore>, exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self {
            state: Mutex::new(TokenState::NoToken),
            store,
            exchanger,
            login: None,
            interactive_on_demand: false,
            login_guard: Mutex::new(()),
        }
    }

    /// Installs the browser handshake. With `on_demand`, a missing credential
    /// during [`Self::ensure_token`] starts it instead of failing.
    pub fn with_interactive_login(
        mut self,
        login: Arc<dyn InteractiveLogin>,
        on_demand: bool,
    ) -> Self {
        self.login = Some(login);
        self.interactive_on_demand = on_demand;
        self
    }

    /// Returns a token that is valid for at least the refresh buffer,
    /// acquiring or refreshing it first when needed.
    pub async fn ensure_token(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;
        if let TokenState::Valid(record) = &*state {
            if !record.needs_refresh(Utc::now()) {
                return Ok(record.access_token().to_string());
            }
            info!(expires_at = %record.expires_at(), "copilot token near expiry; refreshing");
        }

        let credential = match self.store.load()? {
            Some(stored) => stored.github_token,
            None if self.interactive_on_demand && self.login.is_some() => {
                match self.run_login().await {
                    Ok(credential) => credential,
                    Err(err) => {
                        *state = TokenState::Invalid;
                        return Err(err);
                    }
                }
            }
            None => {
                *state = TokenState::Invalid;
                return Err(AuthError::NotAuthenticated);
            }
        };

        match self.exchanger.exchange(&credential).await {
            Ok(record) => {
                info!(expires_at = %record.expires_at(), "copilot token acquired");
                let token = record.access_token().to_string();
                *state = TokenState::Valid(record);
                Ok(token)
            }
            Err(err) => {
                // Any failed exchange forces a fresh login.
                *state = TokenState::Invalid;
                warn!(%err, "copilot token exchange failed; discarding long-lived credential");
                self.store.clear()?;
                Err(AuthError::RefreshFailed(err.to_string()))
            }
        }
    }

    /// Runs the browser handshake and stores the resulting credential. The
    /// next [`Self::ensure_token`] exchanges it for a fresh token.
    pub async fn login(&self) -> Result<(), AuthError> {
        self.run_login().await?;
        *self.state.lock().await = TokenState::NoToken;
        Ok(())
    }

    /// Forgets both the cached token and the stored credential.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        self.store.clear()?;
        *state = TokenState::NoToken;
        info!("signed out of GitHub Copilot");
        Ok(())
    }

    pub fn status(&self) -> TokenStatus {
        let Ok(state) = self.state.try_lock() else {
            return TokenStatus::Refreshing;
        };
        match &*state {
            TokenState::NoToken => TokenStatus::NoToken,
            TokenState::Valid(record) => TokenStatus::Valid {
                expires_at: record.expires_at(),
            },
            TokenState::Invalid => TokenStatus::Invalid,
        }
    }

    /// Whether a long-lived credential is available without a login.
    pub fn has_stored_credential(&self) -> bool {
        matches!(self.store.load(), Ok(Some(_)))
    }

    /// Adds the bearer token and the Copilot identification headers.
    pub async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, AuthError> {
        let token = self.ensure_token().await?;
        Ok(request
            .bearer_auth(token)
            .header("Editor-Version", EDITOR_VERSION)
            .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
            .header("Copilot-Integration-Id", COPILOT_INTEGRATION_ID)
            .header(reqwest::header::USER_AGENT, USER_AGENT))
    }

    /// Only one handshake may own the callback port at a time.
    async fn run_login(&self) -> Result<String, AuthError> {
        let Some(login) = &self.login else {
            return Err(AuthError::Config(
                "interactive login is not available in this build".to_string(),
            ));
        };
        let _guard = self
            .login_guard
            .try_lock()
            .map_err(|_| AuthError::LoginInProgress)?;

        let credential = login.login().await?;
        self.store.save(&StoredCredential::new(credential.clone()))?;
        info!("GitHub credential stored");
        Ok(credential)
    }
}
