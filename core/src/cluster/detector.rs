//! Classifies the connected cluster's dialect and hosting environment.
//!
//! Steps run in order and short-circuit on the first signal:
//! 1. `oc version -o json` distribution signature, with an
//!    `infrastructure/cluster` lookup to break ties.
//! 2. `api-versions` scanned for OpenShift API groups.
//! 3. Plain Kubernetes, hosting inferred from node metadata.
//!
//! Any probe error inside a step means "no signal from this step".

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::ClusterDetectionResult;
use super::ClusterDialect;
use super::ClusterTarget;
use super::CliTool;
use super::HostingEnvironment;
use super::ToolAvailability;
use super::command::CliCommand;
use super::probe::HEAVY_PROBE_TIMEOUT;
use super::probe::LIGHT_PROBE_TIMEOUT;
use super::probe::ProcessRunner;
use super::probe::probe_availability;

/// Whole-token markers in `oc version` output naming a managed offering.
const DISTRIBUTION_MARKERS: &[(&str, &str, HostingEnvironment)] = &[
    ("rosa", "ROSA", HostingEnvironment::Aws),
    ("aro", "ARO", HostingEnvironment::Azure),
    ("osd", "OpenShift Dedicated", HostingEnvironment::Gcp),
];

/// API group fragments only an OpenShift API server serves.
const OPENSHIFT_API_GROUPS: &[&str] = &[
    "config.openshift.io",
    "route.openshift.io",
    "project.openshift.io",
    "security.openshift.io",
];

/// Node label fragments, checked in order, that identify a managed service.
const NODE_LABEL_SIGNALS: &[(&str, &str, HostingEnvironment)] = &[
    ("eks.amazonaws.com", "EKS", HostingEnvironment::Aws),
    ("kubernetes.azure.com", "AKS", HostingEnvironment::Azure),
    ("cloud.google.com/gke", "GKE", HostingEnvironment::Gcp),
    ("k3s.io", "k3s", HostingEnvironment::SelfManaged),
    ("minikube.k8s.io", "minikube", HostingEnvironment::SelfManaged),
];

/// `spec.providerID` prefixes.
const PROVIDER_ID_SIGNALS: &[(&str, HostingEnvironment)] = &[
    ("aws://", HostingEnvironment::Aws),
    ("azure://", HostingEnvironment::Azure),
    ("gce://", HostingEnvironment::Gcp),
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectionError {
    #[error("cluster detection failed: {reason}")]
    DetectionFailed { reason: String },
}

pub struct ClusterTypeDetector {
    runner: Arc<dyn ProcessRunner>,
    target: ClusterTarget,
}

impl ClusterTypeDetector {
    pub fn new(runner: Arc<dyn ProcessRunner>, target: ClusterTarget) -> Self {
        Self { runner, target }
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    pub fn target(&self) -> &ClusterTarget {
        &self.target
    }

    /// Probes tool availability, then classifies the cluster.
    pub async fn detect(&self) -> Result<ClusterDetectionResult, DetectionError> {
        let available = probe_availability(self.runner.as_ref()).await;
        self.detect_with(available).await
    }

    /// Classifies the cluster given already-probed tool availability.
    pub async fn detect_with(
        &self,
        available: ToolAvailability,
    ) -> Result<ClusterDetectionResult, DetectionError> {
        let Some(query_tool) = available.first_installed() else {
            return Err(DetectionError::DetectionFailed {
                reason: "neither kubectl nor oc is installed".to_string(),
            });
        };

        if available.oc {
            if let Some(result) = self.detect_platform_signature().await {
                tracing::debug!(?result, "classified from oc version signature");
                return Ok(result);
            }
        }

        let api_groups = self.api_versions(query_tool).await;
        let serves_openshift_groups = api_groups.as_deref().is_some_and(|groups| {
            OPENSHIFT_API_GROUPS
                .iter()
                .any(|fragment| groups.contains(fragment))
        });
        if serves_openshift_groups {
            return Ok(ClusterDetectionResult {
                dialect: ClusterDialect::OpenShift,
                hosting_environment: HostingEnvironment::Unknown,
                distribution_label: None,
                reported_version: None,
            });
        }

        let nodes = self.list_nodes(query_tool).await;
        if api_groups.is_none() && nodes.is_none() {
            return Err(DetectionError::DetectionFailed {
                reason: format!("the cluster could not be reached through {query_tool}"),
            });
        }

        let (hosting_environment, distribution_label) = match &nodes {
            Some(nodes) => classify_nodes(nodes),
            None => (HostingEnvironment::Unknown, None),
        };
        Ok(ClusterDetectionResult {
            dialect: ClusterDialect::Kubernetes,
            hosting_environment,
            distribution_label,
            reported_version: nodes.as_ref().and_then(|n| kubelet_version(n)),
        })
    }

    async fn detect_platform_signature(&self) -> Option<ClusterDetectionResult> {
        let output = CliCommand::new(CliTool::Oc)
            .target(&self.target)
            .arg("version")
            .json()
            .capture(self.runner.as_ref(), LIGHT_PROBE_TIMEOUT)
            .await
            .map_err(|e| tracing::debug!("oc version probe gave no signal: {e}"))
            .ok()?;

        let parsed: Option<Value> = serde_json::from_str(&output.stdout).ok();
        let openshift_version = parsed
            .as_ref()
            .and_then(|v| v.get("openshiftVersion"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let lowered = output.stdout.to_ascii_lowercase();
        let marker = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|token| {
                DISTRIBUTION_MARKERS
                    .iter()
                    .find(|(marker, _, _)| *marker == token)
            });

        if let Some((_, label, hosting)) = marker {
            return Some(ClusterDetectionResult {
                dialect: ClusterDialect::OpenShift,
                hosting_environment: *hosting,
                distribution_label: Some((*label).to_string()),
                reported_version: openshift_version,
            });
        }

        let openshift_version = openshift_version?;
        let hosting_environment = self.infrastructure_platform().await;
        Some(ClusterDetectionResult {
            dialect: ClusterDialect::OpenShift,
            hosting_environment,
            distribution_label: Some("OpenShift".to_string()),
            reported_version: Some(openshift_version),
        })
    }

    async fn infrastructure_platform(&self) -> HostingEnvironment {
        let infra = CliCommand::new(CliTool::Oc)
            .target(&self.target)
            .args(["get", "infrastructure", "cluster"])
            .json()
            .capture_json(self.runner.as_ref(), LIGHT_PROBE_TIMEOUT)
            .await;

        let infra = match infra {
            Ok(infra) => infra,
            Err(e) => {
                tracing::debug!("infrastructure lookup gave no signal: {e}");
                return HostingEnvironment::Unknown;
            }
        };

        let platform = infra
            .pointer("/status/platformStatus/type")
            .or_else(|| infra.pointer("/status/platform"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        platform_to_hosting(platform)
    }

    async fn api_versions(&self, tool: CliTool) -> Option<String> {
        CliCommand::new(tool)
            .target(&self.target)
            .arg("api-versions")
            .capture(self.runner.as_ref(), HEAVY_PROBE_TIMEOUT)
            .await
            .map(|output| output.stdout)
            .map_err(|e| tracing::debug!("api-versions gave no signal: {e}"))
            .ok()
    }

    async fn list_nodes(&self, tool: CliTool) -> Option<Vec<Value>> {
        let listing = CliCommand::new(tool)
            .target(&self.target)
            .args(["get", "nodes"])
            .json()
            .capture_json(self.runner.as_ref(), HEAVY_PROBE_TIMEOUT)
            .await
            .map_err(|e| tracing::debug!("node listing gave no signal: {e}"))
            .ok()?;
        listing
            .get("items")
            .and_then(Value::as_array)
            .cloned()
    }
}

fn platform_to_hosting(platform: &str) -> HostingEnvironment {
    match platform.to_ascii_lowercase().as_str() {
        "aws" => HostingEnvironment::Aws,
        "azure" => HostingEnvironment::Azure,
        "gcp" => HostingEnvironment::Gcp,
        "none" | "baremetal" | "vsphere" | "openstack" | "nutanix" | "ovirt" | "kubevirt" => {
            HostingEnvironment::SelfManaged
        }
        _ => HostingEnvironment::Unknown,
    }
}

/// Infers hosting from node metadata. Nodes with no recognizable signal are
/// treated as self-managed; an empty listing is `Unknown`.
fn classify_nodes(nodes: &[Value]) -> (HostingEnvironment, Option<String>) {
    if nodes.is_empty() {
        return (HostingEnvironment::Unknown, None);
    }

    for node in nodes {
        if let Some(labels) = node.pointer("/metadata/labels").and_then(Value::as_object) {
            for (fragment, label, hosting) in NODE_LABEL_SIGNALS {
                let matched = labels.iter().any(|(key, value)| {
                    key.contains(fragment) || value.as_str().is_some_and(|v| v.contains(fragment))
                });
                if matched {
                    return (*hosting, Some((*label).to_string()));
                }
            }
        }
    }

    for node in nodes {
        let provider_id = node
            .pointer("/spec/providerID")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some((_, hosting)) = PROVIDER_ID_SIGNALS
            .iter()
            .find(|(prefix, _)| provider_id.starts_with(prefix))
        {
            return (*hosting, None);
        }
    }

    if kubelet_version(nodes).is_some_and(|version| version.contains("+k3s")) {
        return (HostingEnvironment::SelfManaged, Some("k3s".to_string()));
    }

    (HostingEnvironment::SelfManaged, None)
}

fn kubelet_version(nodes: &[Value]) -> Option<String> {
    nodes
        .iter()
        .find_map(|node| node.pointer("/status/nodeInfo/kubeletVersion"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
