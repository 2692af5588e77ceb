//! Minting short-lived Copilot tokens from the long-lived GitHub credential.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::TokenRecord;

pub const COPILOT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";

/// Identification headers the Copilot backend requires on every request.
pub const EDITOR_VERSION: &str = "vscode/1.95.0";
pub const EDITOR_PLUGIN_VERSION: &str = "copilot-chat/0.22.4";
pub const COPILOT_INTEGRATION_ID: &str = "vscode-chat";

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The credential itself was refused; it is revoked or lacks a Copilot seat.
    #[error("credential rejected with HTTP {status}")]
    Rejected { status: StatusCode },

    #[error("token endpoint unavailable (HTTP {status})")]
    Unavailable { status: StatusCode },

    #[error("token endpoint unreachable: {0}")]
    Network(String),

    #[error("unexpected token response: {0}")]
    Parse(String),
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, long_lived: &str) -> Result<TokenRecord, ExchangeError>;
}

#[derive(Deserialize)]
struct CopilotTokenResponse {
    token: String,
    /// Unix seconds.
    expires_at: i64,
}

pub struct CopilotTokenExchanger {
    client: reqwest::Client,
    token_url: String,
}

impl CopilotTokenExchanger {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_url(client, COPILOT_TOKEN_URL)
    }

    pub fn with_url(client: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
        }
    }
}

#[async_trait]
impl TokenExchanger for CopilotTokenExchanger {
    async fn exchange(&self, long_lived: &str) -> Result<TokenRecord, ExchangeError> {
        let response = self
            .client
            .get(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, format!("token {long_lived}"))
            .header(reqwest::header::ACCEPT, "application/json")
            .header("Editor-Version", EDITOR_VERSION)
            .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let status = response.status();
        debug!(%status, "copilot token exchange response");
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::NOT_FOUND
        {
            return Err(ExchangeError::Rejected { status });
        }
        if !status.is_success() {
            return Err(ExchangeError::Unavailable { status });
        }

        let body: CopilotTokenResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))?;
        let expires_at = DateTime::<Utc>::from_timestamp(body.expires_at, 0)
            .ok_or_else(|| ExchangeError::Parse(format!("bad expires_at {}", body.expires_at)))?;
        Ok(TokenRecord::new(body.token, expires_at))
    }
}
