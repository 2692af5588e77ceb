//! A ready-to-call model backend and its single-shot chat call.

use std::sync::Arc;

use reqwest::RequestBuilder;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use super::Secret;
use crate::provider_auth::AuthError;
use crate::provider_auth::CredentialLifecycleManager;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Request/response shape spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireApi {
    /// `POST {base}/chat/completions`. Also used by Copilot.
    OpenAiChat,
    /// `POST {base}/v1/messages`.
    AnthropicMessages,
    /// `POST {base}/v1beta/models/{model}:generateContent`.
    GeminiGenerateContent,
    /// `POST {base}/api/chat`.
    OllamaChat,
}

/// How outbound requests are authenticated.
#[derive(Clone)]
pub enum RequestAuth {
    Bearer(Secret),
    AnthropicKey(Secret),
    GoogleKey(Secret),
    /// Token fetched from the manager immediately before each send.
    Delegated(Arc<CredentialLifecycleManager>),
    None,
}

impl std::fmt::Debug for RequestAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RequestAuth::Bearer(_) => "Bearer",
            RequestAuth::AnthropicKey(_) => "AnthropicKey",
            RequestAuth::GoogleKey(_) => "GoogleKey",
            RequestAuth::Delegated(_) => "Delegated",
            RequestAuth::None => "None",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("could not reach {provider}: {message}")]
    Network { provider: String, message: String },

    #[error("{provider} returned HTTP {status}: {message}{}", api_remedy(.status))]
    Api {
        provider: String,
        status: StatusCode,
        message: String,
    },

    #[error("unexpected response from {provider}: {message}")]
    Parse { provider: String, message: String },
}

fn api_remedy(status: &StatusCode) -> &'static str {
    match *status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ". Check the configured API key for this provider"
        }
        StatusCode::NOT_FOUND => ". Check the configured model name and base URL",
        StatusCode::TOO_MANY_REQUESTS => ". Rate limited; retry later",
        _ => "",
    }
}

#[derive(Debug)]
pub struct ModelHandle {
    provider_id: String,
    model: String,
    base_url: String,
    wire: WireApi,
    auth: RequestAuth,
    client: reqwest::Client,
}

impl ModelHandle {
    pub fn new(
        provider_id: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        wire: WireApi,
        auth: RequestAuth,
        client: reqwest::Client,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            wire,
            auth,
            client,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn wire_api(&self) -> WireApi {
        self.wire
    }

    fn endpoint(&self) -> String {
        match self.wire {
            WireApi::OpenAiChat => format!("{}/chat/completions", self.base_url),
            WireApi::AnthropicMessages => format!("{}/v1/messages", self.base_url),
            WireApi::GeminiGenerateContent => format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ),
            WireApi::OllamaChat => format!("{}/api/chat", self.base_url),
        }
    }

    fn body(&self, messages: &[ChatMessage]) -> Value {
        match self.wire {
            WireApi::OpenAiChat => json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
            }),
            WireApi::OllamaChat => json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
            }),
            WireApi::AnthropicMessages => {
                let system = joined(messages, ChatRole::System);
                let turns: Vec<&ChatMessage> = messages
                    .iter()
                    .filter(|m| m.role != ChatRole::System)
                    .collect();
                let mut body = json!({
                    "model": self.model,
                    "max_tokens": DEFAULT_MAX_TOKENS,
                    "messages": turns,
                });
                if let Some(system) = system {
                    body["system"] = Value::String(system);
                }
                body
            }
            WireApi::GeminiGenerateContent => {
                let contents: Vec<Value> = messages
                    .iter()
                    .filter(|m| m.role != ChatRole::System)
                    .map(|m| {
                        let role = if m.role == ChatRole::Assistant { "model" } else { "user" };
                        json!({ "role": role, "parts": [{ "text": m.content }] })
                    })
                    .collect();
                let mut body = json!({ "contents": contents });
                if let Some(system) = joined(messages, ChatRole::System) {
                    body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
                }
                body
            }
        }
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ModelError> {
        Ok(match &self.auth {
            RequestAuth::Bearer(key) => request.bearer_auth(key.expose()),
            RequestAuth::AnthropicKey(key) => request
                .header("x-api-key", key.expose())
                .header("anthropic-version", ANTHROPIC_VERSION),
            RequestAuth::GoogleKey(key) => request.header("x-goog-api-key", key.expose()),
            RequestAuth::Delegated(manager) => manager.authorize(request).await?,
            RequestAuth::None => request,
        })
    }

    /// Sends one non-streaming chat request and returns the reply text.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let endpoint = self.endpoint();
        debug!(
            provider = %self.provider_id,
            model = %self.model,
            %endpoint,
            "sending chat request"
        );

        let request = self.client.post(&endpoint).json(&self.body(messages));
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| ModelError::Network {
                provider: self.provider_id.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ModelError::Network {
            provider: self.provider_id.clone(),
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(ModelError::Api {
                provider: self.provider_id.clone(),
                status,
                message: error_message(&text),
            });
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| self.parse_error(e.to_string()))?;
        self.extract_reply(&value)
            .ok_or_else(|| self.parse_error("no reply text in response".to_string()))
    }

    fn extract_reply(&self, value: &Value) -> Option<String> {
        match self.wire {
            WireApi::OpenAiChat => value["choices"][0]["message"]["content"]
                .as_str()
                .map(str::to_string),
            WireApi::OllamaChat => value["message"]["content"].as_str().map(str::to_string),
            WireApi::AnthropicMessages => {
                let text = collect_text(value["content"].as_array()?, |block| {
                    (block["type"] == "text").then(|| block["text"].as_str()).flatten()
                });
                Some(text)
            }
            WireApi::GeminiGenerateContent => {
                let parts = value["candidates"][0]["content"]["parts"].as_array()?;
                Some(collect_text(parts, |part| part["text"].as_str()))
            }
        }
    }

    fn parse_error(&self, message: String) -> ModelError {
        ModelError::Parse {
            provider: self.provider_id.clone(),
            message,
        }
    }
}

fn joined(messages: &[ChatMessage], role: ChatRole) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == role)
        .map(|m| m.content.as_str())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

fn collect_text<'a>(items: &'a [Value], text: impl Fn(&'a Value) -> Option<&'a str>) -> String {
    items.iter().filter_map(text).collect::<Vec<_>>().join("")
}

/// Pulls a human-readable message out of the common error envelopes.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().chars().take(300).collect();
    };
    value["error"]["message"]
        .as_str()
        .or_else(|| value["error"].as_str())
        .or_else(|| value["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}
