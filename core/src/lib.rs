//! Root of the `kubeassist-core` library.

// Library code reports through `tracing`; only the binary prints.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod cluster;
pub mod config;
pub mod default_client;
pub mod model_provider;
pub mod provider_auth;

pub use cluster::CliResolver;
pub use cluster::CliTool;
pub use cluster::ClusterDetectionResult;
pub use cluster::ClusterTarget;
pub use cluster::ClusterTypeDetector;
pub use config::Config;
pub use config::ConfigLoader;
pub use config::ConfigOverrides;
pub use model_provider::ModelFactory;
pub use model_provider::ModelHandle;
pub use model_provider::ProviderDescriptor;
pub use provider_auth::CredentialLifecycleManager;
