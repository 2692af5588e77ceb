//! Memoized choice of which CLI to send cluster commands through.
//!
//! Precedence: an explicit override, then the cached choice, then a fresh
//! detection. Detection is expensive (several process round trips), so the
//! result is cached for the life of the resolver and only cleared by an
//! explicit [`CliResolver::invalidate`] when the active context changes.

use std::sync::Arc;

use kubeassist_async_utils::SingleFlight;
use serde::Serialize;

use super::ClusterDetectionResult;
use super::ClusterDialect;
use super::CliTool;
use super::ToolAvailability;
use super::detector::ClusterTypeDetector;
use super::probe::probe_availability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedCliChoice {
    pub tool: CliTool,
}

pub struct CliResolver {
    detector: Arc<ClusterTypeDetector>,
    choice: SingleFlight<ResolvedCliChoice>,
}

impl CliResolver {
    pub fn new(detector: Arc<ClusterTypeDetector>) -> Self {
        Self {
            detector,
            choice: SingleFlight::new(),
        }
    }

    /// Returns the CLI to use. `explicit` is returned as-is and never cached.
    pub async fn resolve(&self, explicit: Option<CliTool>) -> CliTool {
        if let Some(tool) = explicit {
            return tool;
        }

        let detector = Arc::clone(&self.detector);
        let choice = self
            .choice
            .get_or_run(move || async move { detect_choice(&detector).await })
            .await;
        choice.tool
    }

    /// The cached choice, if any, without triggering detection.
    pub fn cached(&self) -> Option<CliTool> {
        self.choice.cached().map(|choice| choice.tool)
    }

    /// Forgets the cached choice. The next `resolve` re-runs detection.
    pub fn invalidate(&self) {
        tracing::debug!("invalidating cached CLI choice");
        self.choice.invalidate();
    }
}

async fn detect_choice(detector: &ClusterTypeDetector) -> ResolvedCliChoice {
    let available = probe_availability(detector.runner().as_ref()).await;
    let detection = match detector.detect_with(available).await {
        Ok(detection) => detection,
        Err(e) => {
            tracing::warn!("{e}; assuming a plain Kubernetes cluster");
            ClusterDetectionResult::degraded_default()
        }
    };

    let tool = choose_tool(&detection, available);
    tracing::info!(
        dialect = %detection.dialect,
        hosting = %detection.hosting_environment,
        "resolved cluster CLI to {tool}"
    );
    ResolvedCliChoice { tool }
}

/// Maps a detection to a tool. With neither tool installed this still names
/// `kubectl` so the first real invocation reports the missing binary.
pub fn choose_tool(detection: &ClusterDetectionResult, available: ToolAvailability) -> CliTool {
    if detection.dialect == ClusterDialect::OpenShift && available.oc {
        return CliTool::Oc;
    }
    if available.kubectl {
        return CliTool::Kubectl;
    }
    available.first_installed().unwrap_or(CliTool::Kubectl)
}
