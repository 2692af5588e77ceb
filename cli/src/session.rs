use std::sync::Arc;

use kubeassist_core::CliResolver;
use kubeassist_core::CliTool;
use kubeassist_core::ClusterTypeDetector;
use kubeassist_core::Config;
use kubeassist_core::CredentialLifecycleManager;
use kubeassist_core::ModelFactory;
use kubeassist_core::cluster::ProcessRunner;
use kubeassist_core::cluster::SystemProcessRunner;
use kubeassist_core::default_client::DEFAULT_ORIGINATOR;
use kubeassist_core::default_client::create_client;
use kubeassist_core::provider_auth::CopilotTokenExchanger;
use kubeassist_core::provider_auth::FileCredentialStore;
use kubeassist_login::GitHubBrowserLogin;
use kubeassist_login::GitHubLoginOptions;

/// Everything one invocation needs, built once from the merged [`Config`].
pub struct Session {
    config: Config,
    runner: Arc<dyn ProcessRunner>,
    detector: Arc<ClusterTypeDetector>,
    resolver: CliResolver,
    credentials: Arc<CredentialLifecycleManager>,
    client: reqwest::Client,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self::with_runner(config, Arc::new(SystemProcessRunner))
    }

    pub fn with_runner(config: Config, runner: Arc<dyn ProcessRunner>) -> Self {
        let client = create_client(DEFAULT_ORIGINATOR);
        let detector = Arc::new(ClusterTypeDetector::new(
            Arc::clone(&runner),
            config.target.clone(),
        ));
        let resolver = CliResolver::new(Arc::clone(&detector));

        let store = FileCredentialStore::new(&config.home)
            .with_env_fallback(config.github_token.clone());
        let exchanger = CopilotTokenExchanger::new(client.clone());
        let login = GitHubBrowserLogin::new(
            GitHubLoginOptions::new(config.oauth_client_id.clone().unwrap_or_default()),
            client.clone(),
        )
        .on_authorize_url(|url| {
            eprintln!("Open this URL in a browser to authorize kubeassist:\n\n    {url}\n");
        });
        let credentials = Arc::new(
            CredentialLifecycleManager::new(Arc::new(store), Arc::new(exchanger))
                .with_interactive_login(Arc::new(login), config.interactive_login),
        );

        Self {
            config,
            runner,
            detector,
            resolver,
            credentials,
            client,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runner(&self) -> &dyn ProcessRunner {
        self.runner.as_ref()
    }

    pub fn detector(&self) -> &ClusterTypeDetector {
        &self.detector
    }

    /// The configured override, else the memoized detection result.
    pub async fn resolve_cli(&self) -> CliTool {
        self.resolver.resolve(self.config.cli).await
    }

    pub fn credentials(&self) -> &CredentialLifecycleManager {
        &self.credentials
    }

    /// Factory over the configured providers. Copilot counts as ready when a
    /// GitHub credential is on file.
    pub fn model_factory(&self) -> ModelFactory {
        let registry = self
            .config
            .provider_registry(self.credentials.has_stored_credential());
        ModelFactory::new(
            registry,
            self.client.clone(),
            Some(Arc::clone(&self.credentials)),
        )
    }
}
