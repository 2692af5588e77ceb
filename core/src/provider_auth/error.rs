//! Errors surfaced by the delegated-auth lifecycle.
//!
//! Each message names the action that resolves it.

use thiserror::Error;

use super::callback_server::CallbackError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(
        "not signed in to GitHub Copilot. Run `kubeassist auth login`, or supply a stored \
         credential by setting GITHUB_TOKEN"
    )]
    NotAuthenticated,

    #[error(
        "refreshing the GitHub Copilot token failed ({0}). The stored credential was discarded; \
         run `kubeassist auth login` or set GITHUB_TOKEN"
    )]
    RefreshFailed(String),

    #[error(
        "a login is already in progress; complete it in the browser or wait for it to time out"
    )]
    LoginInProgress,

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error("exchanging the authorization code failed: {0}. Run `kubeassist auth login` again")]
    Exchange(String),

    #[error(
        "could not open a browser ({0}). Open the printed URL manually to finish \
         `kubeassist auth login`"
    )]
    BrowserLaunchFailed(String),

    #[error("credential storage error: {0}. Check permissions on the kubeassist home directory")]
    Storage(#[from] std::io::Error),

    #[error("credential file is corrupt: {0}. Run `kubeassist auth logout` then log in again")]
    CorruptCredential(#[from] serde_json::Error),

    #[error("login is not configured: {0}")]
    Config(String),
}
