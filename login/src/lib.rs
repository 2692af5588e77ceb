//! Browser-based GitHub sign-in for the Copilot backend.
//!
//! Implements [`kubeassist_core::provider_auth::InteractiveLogin`] on top of
//! the core callback listener.

mod github;

pub use github::DEFAULT_SCOPE;
pub use github::GITHUB_AUTHORIZE_URL;
pub use github::GITHUB_TOKEN_URL;
pub use github::GitHubBrowserLogin;
pub use github::GitHubLoginOptions;
