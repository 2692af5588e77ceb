//! Language-model backends: descriptors, the registry, and the handle factory.
//!
//! A [`ProviderDescriptor`] says what a backend needs; the [`ModelFactory`]
//! turns a registered descriptor into a cached [`ModelHandle`].

pub mod factory;
pub mod handle;
pub mod registry;

pub use factory::FactoryError;
pub use factory::ModelFactory;
pub use handle::ChatMessage;
pub use handle::ChatRole;
pub use handle::ModelError;
pub use handle::ModelHandle;
pub use handle::WireApi;
pub use registry::ProviderRegistry;

use std::fmt;

use serde::Serialize;
use strum_macros::AsRefStr;
use strum_macros::Display;
use strum_macros::EnumString;

pub const COPILOT_PROVIDER_ID: &str = "copilot";
pub const OLLAMA_PROVIDER_ID: &str = "ollama";

pub const COPILOT_BASE_URL: &str = "https://api.githubcopilot.com";
pub const COPILOT_DEFAULT_MODEL: &str = "gpt-4o";
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3.1";

/// A credential value. `Debug` never shows the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Blank values are treated as absent.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Secret(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Backends reached with a static API key. Declaration order is the
/// default-selection priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DirectKeyVendor {
    OpenAi,
    Anthropic,
    Gemini,
}

impl DirectKeyVendor {
    pub const PRIORITY: [DirectKeyVendor; 3] = [
        DirectKeyVendor::OpenAi,
        DirectKeyVendor::Anthropic,
        DirectKeyVendor::Gemini,
    ];

    /// Provider id this vendor registers under.
    pub fn provider_id(self) -> &'static str {
        match self {
            DirectKeyVendor::OpenAi => "openai",
            DirectKeyVendor::Anthropic => "anthropic",
            DirectKeyVendor::Gemini => "gemini",
        }
    }

    /// Environment variables consulted for the key, first match wins.
    pub fn api_key_env_vars(self) -> &'static [&'static str] {
        match self {
            DirectKeyVendor::OpenAi => &["OPENAI_API_KEY"],
            DirectKeyVendor::Anthropic => &["ANTHROPIC_API_KEY"],
            DirectKeyVendor::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        }
    }

    pub fn base_url_env_var(self) -> &'static str {
        match self {
            DirectKeyVendor::OpenAi => "OPENAI_BASE_URL",
            DirectKeyVendor::Anthropic => "ANTHROPIC_BASE_URL",
            DirectKeyVendor::Gemini => "GEMINI_BASE_URL",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            DirectKeyVendor::OpenAi => "https://api.openai.com/v1",
            DirectKeyVendor::Anthropic => "https://api.anthropic.com",
            DirectKeyVendor::Gemini => "https://generativelanguage.googleapis.com",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            DirectKeyVendor::OpenAi => "gpt-4o",
            DirectKeyVendor::Anthropic => "claude-sonnet-4-5",
            DirectKeyVendor::Gemini => "gemini-2.5-flash",
        }
    }

    pub fn wire_api(self) -> WireApi {
        match self {
            DirectKeyVendor::OpenAi => WireApi::OpenAiChat,
            DirectKeyVendor::Anthropic => WireApi::AnthropicMessages,
            DirectKeyVendor::Gemini => WireApi::GeminiGenerateContent,
        }
    }
}

/// What a backend needs before a handle can be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderDescriptor {
    /// GitHub Copilot: short-lived tokens minted per request from a stored
    /// GitHub credential. `authenticated` records whether one is on file.
    Delegated {
        authenticated: bool,
        base_url: Option<String>,
        model: Option<String>,
    },
    DirectKey {
        vendor: DirectKeyVendor,
        api_key: Option<Secret>,
        base_url: Option<String>,
        model: Option<String>,
    },
    /// Ollama or any server speaking its chat API.
    LocallyHosted {
        endpoint: Option<String>,
        model: Option<String>,
    },
}

impl ProviderDescriptor {
    pub fn copilot(authenticated: bool) -> Self {
        ProviderDescriptor::Delegated {
            authenticated,
            base_url: None,
            model: None,
        }
    }

    pub fn direct_key(vendor: DirectKeyVendor, api_key: Option<Secret>) -> Self {
        ProviderDescriptor::DirectKey {
            vendor,
            api_key,
            base_url: None,
            model: None,
        }
    }

    pub fn ollama(endpoint: Option<String>) -> Self {
        ProviderDescriptor::LocallyHosted {
            endpoint,
            model: None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            ProviderDescriptor::Delegated { .. } => "delegated",
            ProviderDescriptor::DirectKey { .. } => "direct-key",
            ProviderDescriptor::LocallyHosted { .. } => "local",
        }
    }

    /// Model used when the caller does not name one.
    pub fn default_model(&self) -> &str {
        match self {
            ProviderDescriptor::Delegated { model, .. } => {
                model.as_deref().unwrap_or(COPILOT_DEFAULT_MODEL)
            }
            ProviderDescriptor::DirectKey { vendor, model, .. } => {
                model.as_deref().unwrap_or(vendor.default_model())
            }
            ProviderDescriptor::LocallyHosted { model, .. } => {
                model.as_deref().unwrap_or(OLLAMA_DEFAULT_MODEL)
            }
        }
    }

    /// Whether [`ModelFactory::build`] can succeed without further input.
    pub fn is_ready(&self) -> bool {
        match self {
            ProviderDescriptor::Delegated { authenticated, .. } => *authenticated,
            ProviderDescriptor::DirectKey { api_key, .. } => api_key.is_some(),
            ProviderDescriptor::LocallyHosted { endpoint, .. } => endpoint.is_some(),
        }
    }
}
