use std::time::Duration;

pub const DEFAULT_ORIGINATOR: &str = "kubeassist";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared HTTP client for every outbound backend call.
pub fn create_client(originator: &str) -> reqwest::Client {
    let user_agent = format!(
        "{originator}/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!(%err, "falling back to a default HTTP client");
            reqwest::Client::new()
        })
}
