use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use thiserror::Error;
use tracing::debug;

use super::COPILOT_BASE_URL;
use super::ProviderDescriptor;
use super::ProviderRegistry;
use super::handle::ModelHandle;
use super::handle::RequestAuth;
use super::handle::WireApi;
use crate::provider_auth::CredentialLifecycleManager;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FactoryError {
    #[error("unknown model provider `{id}`. Known providers: {}", .known.join(", "))]
    UnknownProvider { id: String, known: Vec<String> },

    #[error("model provider `{id}` is missing {missing}. {remedy}")]
    MissingCredential {
        id: String,
        missing: &'static str,
        remedy: String,
    },

    #[error(
        "no model provider is configured. Set OPENAI_API_KEY, ANTHROPIC_API_KEY or \
         GEMINI_API_KEY, or run `kubeassist auth login`"
    )]
    NoProviderConfigured,
}

#[derive(Default)]
struct FactoryState {
    registry: ProviderRegistry,
    handles: HashMap<String, Arc<ModelHandle>>,
}

/// Builds and caches one [`ModelHandle`] per provider id.
///
/// Registering a descriptor evicts that id's cached handle in the same
/// critical section, so a build never returns a handle made from a
/// superseded descriptor.
pub struct ModelFactory {
    state: Mutex<FactoryState>,
    client: reqwest::Client,
    credentials: Option<Arc<CredentialLifecycleManager>>,
}

impl ModelFactory {
    pub fn new(
        registry: ProviderRegistry,
        client: reqwest::Client,
        credentials: Option<Arc<CredentialLifecycleManager>>,
    ) -> Self {
        Self {
            state: Mutex::new(FactoryState {
                registry,
                handles: HashMap::new(),
            }),
            client,
            credentials,
        }
    }

    pub fn register(&self, id: impl Into<String>, descriptor: ProviderDescriptor) {
        let id = id.into();
        let mut state = self.lock();
        state.registry.register(id.clone(), descriptor);
        if state.handles.remove(&id).is_some() {
            debug!(provider = %id, "evicted cached model handle");
        }
    }

    /// Snapshot of the registered providers.
    pub fn registry(&self) -> ProviderRegistry {
        self.lock().registry.clone()
    }

    /// Returns the cached handle for `id` or builds one. `model` overrides
    /// the descriptor's default model; a different model rebuilds the handle.
    pub fn build(&self, id: &str, model: Option<&str>) -> Result<Arc<ModelHandle>, FactoryError> {
        let mut state = self.lock();
        let Some(descriptor) = state.registry.get(id) else {
            return Err(FactoryError::UnknownProvider {
                id: id.to_string(),
                known: state.registry.ids(),
            });
        };
        let model = model.unwrap_or(descriptor.default_model()).to_string();

        if let Some(handle) = state.handles.get(id) {
            if handle.model() == model {
                return Ok(handle.clone());
            }
        }

        let handle = Arc::new(self.construct(id, &descriptor, model)?);
        debug!(provider = %id, model = %handle.model(), "built model handle");
        state.handles.insert(id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Builds the handle for the provider chosen by
    /// [`ProviderRegistry::default_provider_id`].
    pub fn build_default(&self, model: Option<&str>) -> Result<Arc<ModelHandle>, FactoryError> {
        let id = self
            .lock()
            .registry
            .default_provider_id()
            .ok_or(FactoryError::NoProviderConfigured)?;
        self.build(&id, model)
    }

    fn construct(
        &self,
        id: &str,
        descriptor: &ProviderDescriptor,
        model: String,
    ) -> Result<ModelHandle, FactoryError> {
        let client = self.client.clone();
        match descriptor {
            ProviderDescriptor::DirectKey {
                vendor,
                api_key,
                base_url,
                ..
            } => {
                let Some(key) = api_key.clone() else {
                    return Err(FactoryError::MissingCredential {
                        id: id.to_string(),
                        missing: "an API key",
                        remedy: format!("Set {}", vendor.api_key_env_vars().join(" or ")),
                    });
                };
                let auth = match vendor.wire_api() {
                    WireApi::AnthropicMessages => RequestAuth::AnthropicKey(key),
                    WireApi::GeminiGenerateContent => RequestAuth::GoogleKey(key),
                    WireApi::OpenAiChat | WireApi::OllamaChat => RequestAuth::Bearer(key),
                };
                let base_url = base_url.as_deref().unwrap_or(vendor.default_base_url());
                Ok(ModelHandle::new(id, model, base_url, vendor.wire_api(), auth, client))
            }
            ProviderDescriptor::LocallyHosted { endpoint, .. } => {
                let Some(endpoint) = endpoint else {
                    return Err(FactoryError::MissingCredential {
                        id: id.to_string(),
                        missing: "an endpoint URL",
                        remedy: "Set OLLAMA_HOST (for example http://localhost:11434)".to_string(),
                    });
                };
                Ok(ModelHandle::new(
                    id,
                    model,
                    endpoint.as_str(),
                    WireApi::OllamaChat,
                    RequestAuth::None,
                    client,
                ))
            }
            // No credential is needed up front; the first chat call asks the
            // manager for a token.
            ProviderDescriptor::Delegated { base_url, .. } => {
                let Some(credentials) = self.credentials.clone() else {
                    return Err(FactoryError::MissingCredential {
                        id: id.to_string(),
                        missing: "a credential manager",
                        remedy: "Delegated providers need the GitHub login; run `kubeassist auth login`"
                            .to_string(),
                    });
                };
                Ok(ModelHandle::new(
                    id,
                    model,
                    base_url.as_deref().unwrap_or(COPILOT_BASE_URL),
                    WireApi::OpenAiChat,
                    RequestAuth::Delegated(credentials),
                    client,
                ))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FactoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
