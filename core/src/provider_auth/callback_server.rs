//! Loopback listener that receives the OAuth authorization redirect.
//!
//! The listener binds the first free port from [`CALLBACK_PORTS`], remembers a
//! per-session state nonce, and resolves exactly once: with the authorization
//! code, with a structured failure, or with a timeout. The socket is released
//! before [`OAuthCallbackListener::wait_for_callback`] returns so a follow-up
//! login can bind the same port straight away.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use kubeassist_async_utils::Interrupted;
use kubeassist_async_utils::OrCancelExt;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

use super::pkce::state_nonce;

/// Ports tried in order; the OAuth app's registered redirect URIs must cover them.
pub const CALLBACK_PORTS: [u16; 4] = [3000, 3001, 8080, 8888];

pub const CALLBACK_PATH: &str = "/callback";

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_HEAD: usize = 8 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error(
        "the login callback carried an unexpected state value, so it was rejected. Start \
         `kubeassist auth login` again from this terminal"
    )]
    CsrfMismatch,

    #[error(
        "the authorization server reported `{error}`{}. Run `kubeassist auth login` again",
        detail_suffix(.description)
    )]
    BackendError {
        error: String,
        description: Option<String>,
    },

    #[error(
        "the login callback did not include an authorization code. Run `kubeassist auth login` \
         again"
    )]
    MissingCode,

    #[error(
        "no login callback arrived within {}s. Run `kubeassist auth login` again and finish in \
         the browser",
        .0.as_secs()
    )]
    Timeout(Duration),

    #[error(
        "none of the callback ports {ports:?} could be bound. Free one of them (for example \
         stop whatever listens on {}) and retry",
        .ports.first().copied().unwrap_or_default()
    )]
    PortUnavailable { ports: Vec<u16> },

    #[error("the login was cancelled")]
    Cancelled,

    #[error("callback listener I/O error: {0}")]
    Io(String),
}

fn detail_suffix(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

/// The successful outcome of a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    Resolved,
    Failed,
    TimedOut,
}

/// Shared view of a listener's state that outlives
/// [`OAuthCallbackListener::wait_for_callback`].
#[derive(Debug, Clone)]
pub struct ListenerStatus(Arc<Mutex<ListenerState>>);

impl ListenerStatus {
    pub fn current(&self) -> ListenerState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leaves `Listening` at most once.
    fn settle(&self, terminal: ListenerState) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ListenerState::Listening {
            *state = terminal;
        }
    }
}

pub struct OAuthCallbackListener {
    listener: Option<TcpListener>,
    port: u16,
    expected_state: Arc<str>,
    timeout: Duration,
    shutdown: CancellationToken,
    status: ListenerStatus,
}

impl OAuthCallbackListener {
    /// Binds the first free port in `ports`; [`CALLBACK_PORTS`] in production.
    pub async fn bind_ports(ports: &[u16], timeout: Duration) -> Result<Self, CallbackError> {
        for &port in ports {
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => {
                    let port = match listener.local_addr() {
                        Ok(addr) => addr.port(),
                        Err(err) => return Err(CallbackError::Io(err.to_string())),
                    };
                    debug!(port, "OAuth callback listener bound");
                    return Ok(Self {
                        listener: Some(listener),
                        port,
                        expected_state: Arc::from(state_nonce()),
                        timeout,
                        shutdown: CancellationToken::new(),
                        status: ListenerStatus(Arc::new(Mutex::new(ListenerState::Listening))),
                    });
                }
                Err(err) => debug!(port, %err, "callback port unavailable"),
            }
        }
        Err(CallbackError::PortUnavailable {
            ports: ports.to_vec(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn expected_state(&self) -> &str {
        &self.expected_state
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{CALLBACK_PATH}", self.port)
    }

    pub fn status(&self) -> ListenerStatus {
        self.status.clone()
    }

    /// Cancelling the returned token aborts a pending wait with
    /// [`CallbackError::Cancelled`].
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serves redirect requests until one settles the session or the overall
    /// timeout elapses. Requests for other paths get a 404 and are ignored.
    ///
    /// Connections are served concurrently, so a client that connects and
    /// sends nothing neither delays the timeout nor blocks the real redirect.
    pub async fn wait_for_callback(mut self) -> Result<CallbackParams, CallbackError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let Some(listener) = self.listener.take() else {
            return Err(CallbackError::Io("listener already torn down".to_string()));
        };

        let expected = Arc::clone(&self.expected_state);
        let accept_loop = async {
            // Dropping the set aborts connections still being served.
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            connections.spawn(serve(stream, Arc::clone(&expected)));
                        }
                        Err(err) => warn!(%err, "failed to accept callback connection"),
                    },
                    Some(joined) = connections.join_next() => match joined {
                        Ok(Some(outcome)) => return outcome,
                        Ok(None) => {}
                        Err(err) => warn!(%err, "callback connection task failed"),
                    },
                }
            }
        };

        let outcome = match accept_loop.or_cancel_until(&self.shutdown, deadline).await {
            Ok(outcome) => outcome,
            Err(Interrupted::DeadlineElapsed) => Err(CallbackError::Timeout(self.timeout)),
            Err(Interrupted::Cancelled) => Err(CallbackError::Cancelled),
        };

        drop(listener);
        self.finish(&outcome);
        outcome
    }

    fn finish(&mut self, outcome: &Result<CallbackParams, CallbackError>) {
        match outcome {
            Ok(_) => {
                info!(port = self.port, "OAuth callback received");
                self.status.settle(ListenerState::Resolved);
            }
            Err(CallbackError::Timeout(_)) => {
                warn!(port = self.port, "OAuth callback timed out");
                self.status.settle(ListenerState::TimedOut);
            }
            Err(err) => {
                warn!(port = self.port, %err, "OAuth callback failed");
                self.status.settle(ListenerState::Failed);
            }
        }
        self.teardown();
    }

    /// Releases the socket. Safe to call more than once.
    fn teardown(&mut self) {
        if self.listener.take().is_some() {
            debug!(port = self.port, "OAuth callback listener released");
        }
        self.shutdown.cancel();
    }
}

impl Drop for OAuthCallbackListener {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Handles one connection. `None` means the request did not settle the
/// session and the listener keeps waiting.
async fn serve(
    mut stream: TcpStream,
    expected_state: Arc<str>,
) -> Option<Result<CallbackParams, CallbackError>> {
    let read = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_target(&mut stream));
    let url = match read.await {
        Ok(Some(target)) => Url::parse(&format!("http://localhost{target}")).ok(),
        Ok(None) | Err(_) => None,
    };
    let Some(url) = url else {
        respond(&mut stream, "400 Bad Request", "Malformed request").await;
        return None;
    };
    if url.path() != CALLBACK_PATH {
        respond(&mut stream, "404 Not Found", "Not found").await;
        return None;
    }

    let outcome = evaluate(&url, &expected_state);
    match &outcome {
        Ok(_) => {
            let message = "Signed in. You can close this window and return to the terminal.";
            respond(&mut stream, "200 OK", message).await;
        }
        Err(err) => {
            let message = format!("Sign-in failed: {err}");
            respond(&mut stream, "400 Bad Request", &message).await;
        }
    }
    Some(outcome)
}

/// Applies the redirect rules in order: backend error, state, code.
fn evaluate(url: &Url, expected_state: &str) -> Result<CallbackParams, CallbackError> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(CallbackError::BackendError { error, description });
    }
    let state = match state {
        Some(state) if state == expected_state => state,
        _ => return Err(CallbackError::CsrfMismatch),
    };
    match code {
        Some(code) if !code.is_empty() => Ok(CallbackParams { code, state }),
        _ => Err(CallbackError::MissingCode),
    }
}

/// Reads up to the end of the request head and returns the request target.
async fn read_request_target(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() < MAX_REQUEST_HEAD {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let mut parts = head.lines().next()?.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    (method == "GET" && target.starts_with('/')).then(|| target.to_string())
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) {
    let body = format!(
        "<!DOCTYPE html><html><head><title>kubeassist</title></head>\
         <body><p>{}</p></body></html>",
        html_escape(message)
    );
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(err) = stream.write_all(response.as_bytes()).await {
        debug!(%err, "failed to write callback response");
    }
    let _ = stream.shutdown().await;
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn http() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    async fn ephemeral(timeout: Duration) -> OAuthCallbackListener {
        OAuthCallbackListener::bind_ports(&[0], timeout).await.unwrap()
    }

    fn url(path: &str) -> Url {
        Url::parse(&format!("http://localhost{path}")).unwrap()
    }

    #[test]
    fn evaluate_rule_order() {
        assert_eq!(
            evaluate(&url("/callback?code=c&state=s"), "s"),
            Ok(CallbackParams {
                code: "c".to_string(),
                state: "s".to_string()
            })
        );
        assert_eq!(
            evaluate(&url("/callback?code=c&state=forged"), "s"),
            Err(CallbackError::CsrfMismatch)
        );
        assert_eq!(
            evaluate(&url("/callback?code=c"), "s"),
            Err(CallbackError::CsrfMismatch)
        );
        assert_eq!(
            evaluate(&url("/callback?state=s"), "s"),
            Err(CallbackError::MissingCode)
        );
        assert_eq!(
            evaluate(&url("/callback?error=access_denied&state=forged"), "s"),
            Err(CallbackError::BackendError {
                error: "access_denied".to_string(),
                description: None
            })
        );
    }

    #[test]
    fn evaluate_decodes_query() {
        let params = evaluate(&url("/callback?code=a%2Bb&state=x%3Dy"), "x=y").unwrap();
        assert_eq!(params.code, "a+b");
    }

    #[tokio::test]
    async fn resolves_with_code_on_matching_state() {
        let listener = ephemeral(Duration::from_secs(5)).await;
        let callback = format!(
            "{}?code=abc&state={}",
            listener.redirect_uri(),
            listener.expected_state()
        );
        let state = listener.expected_state().to_string();
        let waiter = tokio::spawn(listener.wait_for_callback());

        let response = http().get(callback).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let params = waiter.await.unwrap().unwrap();
        assert_eq!(params, CallbackParams { code: "abc".to_string(), state });
    }

    #[tokio::test]
    async fn forged_state_never_succeeds() {
        let listener = ephemeral(Duration::from_secs(5)).await;
        let callback = format!("{}?code=valid-code&state=forged", listener.redirect_uri());
        let status = listener.status();
        let waiter = tokio::spawn(listener.wait_for_callback());

        let response = http().get(callback).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(waiter.await.unwrap(), Err(CallbackError::CsrfMismatch));
        assert_eq!(status.current(), ListenerState::Failed);
    }

    #[tokio::test]
    async fn other_paths_are_not_found_and_keep_listening() {
        let listener = ephemeral(Duration::from_secs(5)).await;
        let base = format!("http://127.0.0.1:{}", listener.port());
        let callback = format!(
            "{}?code=abc&state={}",
            listener.redirect_uri(),
            listener.expected_state()
        );
        let waiter = tokio::spawn(listener.wait_for_callback());

        let miss = http().get(format!("{base}/favicon.ico")).send().await.unwrap();
        assert_eq!(miss.status(), reqwest::StatusCode::NOT_FOUND);

        http().get(callback).send().await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap().code, "abc");
    }

    #[tokio::test]
    async fn timeout_releases_port() {
        let listener = ephemeral(Duration::from_millis(100)).await;
        let port = listener.port();
        let status = listener.status();

        let result = listener.wait_for_callback().await;
        assert_eq!(result, Err(CallbackError::Timeout(Duration::from_millis(100))));
        assert_eq!(status.current(), ListenerState::TimedOut);

        let again = OAuthCallbackListener::bind_ports(&[port], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(again.port(), port);
    }

    #[tokio::test]
    async fn occupied_port_is_reported() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let err = OAuthCallbackListener::bind_ports(&[port], Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert_eq!(err, CallbackError::PortUnavailable { ports: vec![port] });
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[tokio::test]
    async fn shutdown_handle_cancels_wait() {
        let listener = ephemeral(Duration::from_secs(30)).await;
        let shutdown = listener.shutdown_handle();
        let waiter = tokio::spawn(listener.wait_for_callback());
        shutdown.cancel();
        assert_eq!(waiter.await.unwrap(), Err(CallbackError::Cancelled));
    }

    #[tokio::test]
    async fn idle_connection_does_not_delay_timeout() {
        let listener = ephemeral(Duration::from_millis(100)).await;
        let _idle = TcpStream::connect(("127.0.0.1", listener.port())).await.unwrap();

        let started = std::time::Instant::now();
        let result = listener.wait_for_callback().await;
        assert_eq!(result, Err(CallbackError::Timeout(Duration::from_millis(100))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn idle_connection_does_not_block_redirect() {
        let listener = ephemeral(Duration::from_secs(5)).await;
        let _preconnect = TcpStream::connect(("127.0.0.1", listener.port())).await.unwrap();
        let callback = format!(
            "{}?code=abc&state={}",
            listener.redirect_uri(),
            listener.expected_state()
        );
        let waiter = tokio::spawn(listener.wait_for_callback());

        let started = std::time::Instant::now();
        http().get(callback).send().await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap().code, "abc");
        assert!(started.elapsed() < REQUEST_READ_TIMEOUT);
    }

    #[tokio::test]
    async fn fresh_listener_reports_listening() {
        let listener = ephemeral(Duration::from_secs(1)).await;
        assert_eq!(listener.status().current(), ListenerState::Listening);
        assert!(listener.redirect_uri().ends_with("/callback"));
        assert_eq!(listener.expected_state().len(), 22);
    }
}
