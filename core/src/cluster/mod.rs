//! Cluster CLI dialect detection and resolution.
//!
//! Leaf to root:
//! - [`probe`]: bounded external-process invocation behind [`ProcessRunner`].
//! - [`version`]: dotted version parsing and client/server skew rules.
//! - [`command`]: the typed `kubectl`/`oc` command builder.
//! - [`detector`]: classifies the connected cluster's dialect and hosting.
//! - [`resolver`]: memoized choice of which CLI to issue commands through.
//! - [`version_info`]: per-tool client/server version report.

pub mod command;
pub mod detector;
pub mod probe;
pub mod resolver;
pub mod version;
pub mod version_info;

pub use command::CliCommand;
pub use command::NamespaceScope;
pub use detector::ClusterTypeDetector;
pub use detector::DetectionError;
pub use probe::ProbeError;
pub use probe::ProcessOutput;
pub use probe::ProcessRunner;
pub use probe::SystemProcessRunner;
pub use probe::ToolProbeResult;
pub use resolver::CliResolver;
pub use resolver::ResolvedCliChoice;
pub use version::Version;
pub use version_info::CliVersionInfo;

use serde::Deserialize;
use serde::Serialize;
use std::path::PathBuf;
use strum_macros::AsRefStr;
use strum_macros::Display;
use strum_macros::EnumString;

/// One of the two interchangeable command-line front-ends for the cluster API.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CliTool {
    Kubectl,
    Oc,
}

impl CliTool {
    /// Executable name looked up on `PATH`.
    pub fn binary(self) -> &'static str {
        match self {
            CliTool::Kubectl => "kubectl",
            CliTool::Oc => "oc",
        }
    }

    /// Where to download the tool from.
    pub fn acquisition_hint(self) -> &'static str {
        match self {
            CliTool::Kubectl => "https://kubernetes.io/docs/tasks/tools/",
            CliTool::Oc => "https://mirror.openshift.com/pub/openshift-v4/clients/ocp/",
        }
    }
}

/// The API dialect spoken by the connected cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ClusterDialect {
    /// Plain Kubernetes; any conformant CLI works.
    Kubernetes,
    /// OpenShift; exposes `*.openshift.io` API groups best driven through `oc`.
    OpenShift,
}

/// Where the cluster's nodes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
pub enum HostingEnvironment {
    Aws,
    Azure,
    Gcp,
    SelfManaged,
    Unknown,
}

/// Outcome of one detection attempt. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDetectionResult {
    pub dialect: ClusterDialect,
    pub hosting_environment: HostingEnvironment,
    pub distribution_label: Option<String>,
    pub reported_version: Option<String>,
}

impl ClusterDetectionResult {
    /// The assumption used when detection could not determine anything.
    pub fn degraded_default() -> Self {
        Self {
            dialect: ClusterDialect::Kubernetes,
            hosting_environment: HostingEnvironment::Unknown,
            distribution_label: None,
            reported_version: None,
        }
    }
}

/// Connection flags applied to every command sent to the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterTarget {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub namespace: Option<String>,
}

/// Which of the two CLIs are installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolAvailability {
    pub kubectl: bool,
    pub oc: bool,
}

impl ToolAvailability {
    pub fn any(self) -> bool {
        self.kubectl || self.oc
    }

    /// The tool used for dialect-neutral queries: `kubectl` when present.
    pub fn first_installed(self) -> Option<CliTool> {
        if self.kubectl {
            Some(CliTool::Kubectl)
        } else if self.oc {
            Some(CliTool::Oc)
        } else {
            None
        }
    }
}
