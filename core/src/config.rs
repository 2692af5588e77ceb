//! Layered configuration for kubeassist.
//!
//! Precedence, lowest first:
//! 1. Built-in defaults
//! 2. `$KUBEASSIST_HOME/config.toml` (default `~/.kubeassist/config.toml`)
//! 3. Environment variables
//! 4. Command-line overrides ([`ConfigOverrides`])
//!
//! The loader reads an injected environment map so tests never touch the
//! process environment.
//!
//! ```toml
//! cli = "oc"
//! context = "prod"
//! model_provider = "anthropic"
//! interactive_login = true
//!
//! [providers.anthropic]
//! kind = "anthropic"
//! model = "claude-sonnet-4-5"
//!
//! [providers.lab-ollama]
//! kind = "ollama"
//! base_url = "http://gpu-box:11434"
//! ```

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::cluster::CliTool;
use crate::cluster::ClusterTarget;
use crate::model_provider::COPILOT_PROVIDER_ID;
use crate::model_provider::DirectKeyVendor;
use crate::model_provider::OLLAMA_PROVIDER_ID;
use crate::model_provider::ProviderDescriptor;
use crate::model_provider::ProviderRegistry;
use crate::model_provider::Secret;

pub const CONFIG_FILE: &str = "config.toml";
const DEFAULT_HOME_DIR: &str = ".kubeassist";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid TOML: {source}. Fix or remove the file", .path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value `{value}` for {key} (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("cannot determine the home directory; set KUBEASSIST_HOME")]
    NoHome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Copilot,
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderToml {
    pub kind: Option<ProviderKind>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Shape of `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigToml {
    pub cli: Option<String>,
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub model_provider: Option<String>,
    pub model: Option<String>,
    pub oauth_client_id: Option<String>,
    pub interactive_login: Option<bool>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderToml>,
}

/// Values from command-line flags; `Some` wins over every other layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub cli: Option<CliTool>,
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub model_provider: Option<String>,
    pub model: Option<String>,
}

/// Fully merged configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub cli: Option<CliTool>,
    pub target: ClusterTarget,
    pub model_provider: Option<String>,
    pub model: Option<String>,
    pub oauth_client_id: Option<String>,
    pub interactive_login: bool,
    /// Long-lived GitHub credential supplied through `GITHUB_TOKEN`.
    pub github_token: Option<String>,
    pub providers: BTreeMap<String, ProviderDescriptor>,
}

impl Config {
    /// Registry of every configured provider. `delegated_authenticated`
    /// reflects whether a GitHub credential is on file.
    pub fn provider_registry(&self, delegated_authenticated: bool) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for (id, descriptor) in &self.providers {
            let descriptor = match descriptor.clone() {
                ProviderDescriptor::Delegated {
                    base_url, model, ..
                } => ProviderDescriptor::Delegated {
                    authenticated: delegated_authenticated,
                    base_url,
                    model,
                },
                other => other,
            };
            registry.register(id.clone(), descriptor);
        }
        registry
    }
}

pub struct ConfigLoader {
    home: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader over the current process environment.
    pub fn new() -> Self {
        Self::with_env(std::env::vars().collect())
    }

    pub fn with_env(env: HashMap<String, String>) -> Self {
        Self {
            home: None,
            env,
        }
    }

    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = Some(home);
        self
    }

    pub fn load(self, overrides: ConfigOverrides) -> Result<Config, ConfigError> {
        let home = self.resolve_home()?;
        let file = load_file(&home.join(CONFIG_FILE))?;

        let mut config = Config {
            home,
            cli: None,
            target: ClusterTarget::default(),
            model_provider: None,
            model: None,
            oauth_client_id: None,
            interactive_login: false,
            github_token: None,
            providers: builtin_providers(),
        };

        self.apply_file(&mut config, file)?;
        self.apply_env(&mut config)?;
        apply_overrides(&mut config, overrides);
        Ok(config)
    }

    fn var(&self, key: &str) -> Option<String> {
        self.env
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn resolve_home(&self) -> Result<PathBuf, ConfigError> {
        if let Some(home) = &self.home {
            return Ok(home.clone());
        }
        if let Some(home) = self.var("KUBEASSIST_HOME") {
            return Ok(PathBuf::from(home));
        }
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_HOME_DIR))
            .ok_or(ConfigError::NoHome)
    }

    fn apply_file(&self, config: &mut Config, file: ConfigToml) -> Result<(), ConfigError> {
        if let Some(cli) = file.cli {
            config.cli = Some(parse_cli("cli", &cli)?);
        }
        config.target.context = file.context;
        config.target.namespace = file.namespace;
        config.target.kubeconfig = file.kubeconfig;
        config.model_provider = file.model_provider;
        config.model = file.model;
        config.oauth_client_id = file.oauth_client_id;
        config.interactive_login = file.interactive_login.unwrap_or(false);

        for (id, table) in file.providers {
            let kind = match table.kind {
                Some(kind) => kind,
                None => builtin_kind(&id).ok_or_else(|| ConfigError::InvalidValue {
                    key: format!("providers.{id}.kind"),
                    value: String::new(),
                    expected: "one of copilot, openai, anthropic, gemini, ollama",
                })?,
            };
            let base = config
                .providers
                .remove(&id)
                .filter(|existing| descriptor_kind(existing) == kind)
                .unwrap_or_else(|| empty_descriptor(kind));
            config.providers.insert(id, overlay(base, table));
        }
        Ok(())
    }

    fn apply_env(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(cli) = self.var("KUBEASSIST_CLI") {
            config.cli = Some(parse_cli("KUBEASSIST_CLI", &cli)?);
        }
        if let Some(kubeconfig) = self.var("KUBECONFIG") {
            // An explicit kubeconfig from the file beats the ambient variable.
            let first = std::env::split_paths(&kubeconfig).next();
            if config.target.kubeconfig.is_none() {
                config.target.kubeconfig = first;
            }
        }
        if let Some(provider) = self.var("KUBEASSIST_MODEL_PROVIDER") {
            config.model_provider = Some(provider);
        }
        if let Some(model) = self.var("KUBEASSIST_MODEL") {
            config.model = Some(model);
        }
        if let Some(client_id) = self.var("KUBEASSIST_OAUTH_CLIENT_ID") {
            config.oauth_client_id = Some(client_id);
        }
        config.github_token = self.var("GITHUB_TOKEN");

        for vendor in DirectKeyVendor::PRIORITY {
            let key = vendor
                .api_key_env_vars()
                .iter()
                .find_map(|name| self.var(name))
                .and_then(Secret::new);
            let url = self.var(vendor.base_url_env_var());
            if let Some(ProviderDescriptor::DirectKey {
                api_key, base_url, ..
            }) = config.providers.get_mut(vendor.provider_id())
            {
                if key.is_some() {
                    *api_key = key;
                }
                if url.is_some() {
                    *base_url = url;
                }
            }
        }

        if let Some(host) = self.var("OLLAMA_HOST") {
            if let Some(ProviderDescriptor::LocallyHosted { endpoint, .. }) =
                config.providers.get_mut(OLLAMA_PROVIDER_ID)
            {
                *endpoint = Some(normalize_host(&host));
            }
        }

        debug!(home = %config.home.display(), "configuration loaded");
        Ok(())
    }
}

fn apply_overrides(config: &mut Config, overrides: ConfigOverrides) {
    if overrides.cli.is_some() {
        config.cli = overrides.cli;
    }
    if overrides.context.is_some() {
        config.target.context = overrides.context;
    }
    if overrides.namespace.is_some() {
        config.target.namespace = overrides.namespace;
    }
    if overrides.kubeconfig.is_some() {
        config.target.kubeconfig = overrides.kubeconfig;
    }
    if overrides.model_provider.is_some() {
        config.model_provider = overrides.model_provider;
    }
    if overrides.model.is_some() {
        config.model = overrides.model;
    }
}

fn load_file(path: &Path) -> Result<ConfigToml, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(ConfigToml::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&contents).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_cli(key: &str, value: &str) -> Result<CliTool, ConfigError> {
    CliTool::from_str(value).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: "kubectl or oc",
    })
}

fn builtin_providers() -> BTreeMap<String, ProviderDescriptor> {
    let mut providers = BTreeMap::new();
    providers.insert(
        COPILOT_PROVIDER_ID.to_string(),
        ProviderDescriptor::copilot(false),
    );
    for vendor in DirectKeyVendor::PRIORITY {
        providers.insert(
            vendor.provider_id().to_string(),
            ProviderDescriptor::direct_key(vendor, None),
        );
    }
    providers.insert(
        OLLAMA_PROVIDER_ID.to_string(),
        ProviderDescriptor::ollama(None),
    );
    providers
}

fn builtin_kind(id: &str) -> Option<ProviderKind> {
    match id {
        COPILOT_PROVIDER_ID => Some(ProviderKind::Copilot),
        "openai" => Some(ProviderKind::OpenAi),
        "anthropic" => Some(ProviderKind::Anthropic),
        "gemini" => Some(ProviderKind::Gemini),
        OLLAMA_PROVIDER_ID => Some(ProviderKind::Ollama),
        _ => None,
    }
}

fn descriptor_kind(descriptor: &ProviderDescriptor) -> ProviderKind {
    match descriptor {
        ProviderDescriptor::Delegated { .. } => ProviderKind::Copilot,
        ProviderDescriptor::DirectKey { vendor, .. } => match vendor {
            DirectKeyVendor::OpenAi => ProviderKind::OpenAi,
            DirectKeyVendor::Anthropic => ProviderKind::Anthropic,
            DirectKeyVendor::Gemini => ProviderKind::Gemini,
        },
        ProviderDescriptor::LocallyHosted { .. } => ProviderKind::Ollama,
    }
}

fn empty_descriptor(kind: ProviderKind) -> ProviderDescriptor {
    match kind {
        ProviderKind::Copilot => ProviderDescriptor::copilot(false),
        ProviderKind::OpenAi => ProviderDescriptor::direct_key(DirectKeyVendor::OpenAi, None),
        ProviderKind::Anthropic => ProviderDescriptor::direct_key(DirectKeyVendor::Anthropic, None),
        ProviderKind::Gemini => ProviderDescriptor::direct_key(DirectKeyVendor::Gemini, None),
        ProviderKind::Ollama => ProviderDescriptor::ollama(None),
    }
}

fn overlay(base: ProviderDescriptor, table: ProviderToml) -> ProviderDescriptor {
    match base {
        ProviderDescriptor::Delegated {
            authenticated,
            base_url,
            model,
        } => ProviderDescriptor::Delegated {
            authenticated,
            base_url: table.base_url.or(base_url),
            model: table.model.or(model),
        },
        ProviderDescriptor::DirectKey {
            vendor,
            api_key,
            base_url,
            model,
        } => ProviderDescriptor::DirectKey {
            vendor,
            api_key: table.api_key.and_then(Secret::new).or(api_key),
            base_url: table.base_url.or(base_url),
            model: table.model.or(model),
        },
        ProviderDescriptor::LocallyHosted { endpoint, model } => {
            ProviderDescriptor::LocallyHosted {
                endpoint: table.base_url.map(|url| normalize_host(&url)).or(endpoint),
                model: table.model.or(model),
            }
        }
    }
}

/// `OLLAMA_HOST` is commonly given as `host:port`.
fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", host.trim_end_matches('/'))
    }
}
