//! GitHub OAuth web flow with a loopback redirect (authorization code + PKCE).
//!
//! 1. Bind an [`OAuthCallbackListener`] on a loopback port.
//! 2. Send the user to GitHub's authorize page with the state nonce and the
//!    S256 code challenge.
//! 3. Wait for the redirect, then trade the code (plus verifier) for the
//!    long-lived GitHub token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kubeassist_core::provider_auth::AuthError;
use kubeassist_core::provider_auth::InteractiveLogin;
use kubeassist_core::provider_auth::OAuthCallbackListener;
use kubeassist_core::provider_auth::callback_server::CALLBACK_PORTS;
use kubeassist_core::provider_auth::callback_server::DEFAULT_CALLBACK_TIMEOUT;
use kubeassist_core::provider_auth::pkce::PkcePair;
use serde::Deserialize;
use tracing::info;
use tracing::warn;
use url::Url;

pub const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
pub const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const DEFAULT_SCOPE: &str = "read:user";

type UrlNotifier = Arc<dyn Fn(&Url) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct GitHubLoginOptions {
    pub client_id: String,
    /// Only needed for OAuth apps that are not configured as public clients.
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub scope: String,
    pub ports: Vec<u16>,
    pub timeout: Duration,
    pub open_browser: bool,
}

impl GitHubLoginOptions {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            authorize_url: GITHUB_AUTHORIZE_URL.to_string(),
            token_url: GITHUB_TOKEN_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            ports: CALLBACK_PORTS.to_vec(),
            timeout: DEFAULT_CALLBACK_TIMEOUT,
            open_browser: true,
        }
    }
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub struct GitHubBrowserLogin {
    options: GitHubLoginOptions,
    client: reqwest::Client,
    notify: Option<UrlNotifier>,
}

impl GitHubBrowserLogin {
    pub fn new(options: GitHubLoginOptions, client: reqwest::Client) -> Self {
        Self {
            options,
            client,
            notify: None,
        }
    }

    /// Called with the authorize URL before the browser is opened, so a
    /// front-end can print it for manual use.
    pub fn on_authorize_url(mut self, notify: impl Fn(&Url) + Send + Sync + 'static) -> Self {
        self.notify = Some(Arc::new(notify));
        self
    }

    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.options.authorize_url)
            .map_err(|e| AuthError::Config(format!("invalid authorize URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.options.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.options.scope)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    /// Trades an authorization code for the long-lived GitHub token.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<String, AuthError> {
        let mut form = vec![
            ("client_id", self.options.client_id.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(secret) = &self.options.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .client
            .post(&self.options.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Exchange(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        // GitHub reports grant errors with a 200 and an `error` field.
        let body: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(format!("unexpected token response: {e}")))?;
        if let Some(error) = body.error {
            let detail = body.error_description.unwrap_or_default();
            return Err(AuthError::Exchange(format!("{error} {detail}").trim().to_string()));
        }
        body.access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::Exchange("response carried no access_token".to_string()))
    }

    fn present(&self, url: &Url) -> Result<(), AuthError> {
        if let Some(notify) = &self.notify {
            notify(url);
        }
        if !self.options.open_browser {
            return Ok(());
        }
        match webbrowser::open(url.as_str()) {
            Ok(()) => Ok(()),
            // The URL was already handed to the front-end.
            Err(err) if self.notify.is_some() => {
                warn!(%err, "could not open a browser");
                Ok(())
            }
            Err(err) => Err(AuthError::BrowserLaunchFailed(err.to_string())),
        }
    }
}

#[async_trait]
impl InteractiveLogin for GitHubBrowserLogin {
    async fn login(&self) -> Result<String, AuthError> {
        if self.options.client_id.trim().is_empty() {
            return Err(AuthError::Config(
                "no OAuth client id; set KUBEASSIST_OAUTH_CLIENT_ID or `oauth_client_id` in config.toml"
                    .to_string(),
            ));
        }

        let listener =
            OAuthCallbackListener::bind_ports(&self.options.ports, self.options.timeout).await?;
        let redirect_uri = listener.redirect_uri();
        let pkce = PkcePair::generate();
        let url = self.authorize_url(&redirect_uri, listener.expected_state(), &pkce.challenge)?;

        info!(port = listener.port(), "waiting for GitHub authorization");
        self.present(&url)?;

        let params = listener.wait_for_callback().await?;
        let token = self
            .exchange_code(&params.code, &pkce.verifier, &redirect_uri)
            .await?;
        info!("GitHub authorization complete");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_string_contains;
    use wiremock::matchers::header;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn options(server: &MockServer) -> GitHubLoginOptions {
        GitHubLoginOptions {
            token_url: format!("{}/login/oauth/access_token", server.uri()),
            ports: vec![0],
            timeout: Duration::from_secs(10),
            open_browser: false,
            ..GitHubLoginOptions::new("Iv1.test")
        }
    }

    fn query(url: &Url, key: &str) -> String {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn authorize_url_carries_state_and_challenge() {
        let login =
            GitHubBrowserLogin::new(GitHubLoginOptions::new("Iv1.abc"), reqwest::Client::new());
        let url = login
            .authorize_url("http://localhost:3000/callback", "nonce", "challenge")
            .unwrap();

        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(query(&url, "client_id"), "Iv1.abc");
        assert_eq!(query(&url, "redirect_uri"), "http://localhost:3000/callback");
        assert_eq!(query(&url, "state"), "nonce");
        assert_eq!(query(&url, "code_challenge"), "challenge");
        assert_eq!(query(&url, "code_challenge_method"), "S256");
    }

    #[tokio::test]
    async fn exchange_code_returns_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(header("accept", "application/json"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("code_verifier=v"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "gho_new",
                "token_type": "bearer",
                "scope": "read:user"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let login = GitHubBrowserLogin::new(options(&server), reqwest::Client::new());
        let token = login
            .exchange_code("abc", "v", "http://localhost:3000/callback")
            .await
            .unwrap();
        assert_eq!(token, "gho_new");
    }

    #[tokio::test]
    async fn exchange_code_surfaces_grant_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": "bad_verification_code",
                "error_description": "The code passed is incorrect or expired."
            })))
            .mount(&server)
            .await;

        let login = GitHubBrowserLogin::new(options(&server), reqwest::Client::new());
        let err = login.exchange_code("stale", "v", "r").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Exchange(ref m) if m.starts_with("bad_verification_code")
        ));
    }

    #[tokio::test]
    async fn full_browser_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_string_contains("code=granted"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "gho_flow" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (tx, rx) = tokio::sync::oneshot::channel::<Url>();
        let slot = Mutex::new(Some(tx));
        let login = GitHubBrowserLogin::new(options(&server), reqwest::Client::new())
            .on_authorize_url(move |url| {
                if let Some(tx) = slot.lock().unwrap().take() {
                    let _ = tx.send(url.clone());
                }
            });

        let browser = tokio::spawn(async move {
            let url = rx.await.unwrap();
            let callback = format!(
                "{}?code=granted&state={}",
                query(&url, "redirect_uri"),
                query(&url, "state")
            );
            reqwest::Client::builder()
                .no_proxy()
                .build()
                .unwrap()
                .get(callback)
                .send()
                .await
                .unwrap()
                .status()
        });

        assert_eq!(login.login().await.unwrap(), "gho_flow");
        assert!(browser.await.unwrap().is_success());
    }

    #[tokio::test]
    async fn missing_client_id_is_a_config_error() {
        let login = GitHubBrowserLogin::new(GitHubLoginOptions::new(""), reqwest::Client::new());
        assert!(matches!(login.login().await.unwrap_err(), AuthError::Config(_)));
    }
}
