//! Bounded external-process probing.
//!
//! A probe failure is an expected steady state (optional tools are often
//! missing), so callers turn [`ProbeError`] into "no signal" rather than
//! propagating it.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;

use super::CliTool;
use super::ToolAvailability;

/// Timeout for lightweight checks (`version`, `--help`).
pub const LIGHT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for data-bearing queries (`get nodes`, `api-versions`).
pub const HEAVY_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Captured output of a successful process run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("{program} was not found on PATH")]
    NotFound { program: String },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with code {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program} produced unusable output: {message}")]
    InvalidOutput { program: String, message: String },

    #[error("failed to run {program}: {message}")]
    Io { program: String, message: String },
}

/// Seam over process execution so detection logic can be driven by fakes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Whether `program` resolves to an executable.
    async fn exists(&self, program: &str) -> bool;

    /// Runs `program args..` and captures stdout, failing after `timeout`.
    async fn capture(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProbeError>;
}

/// [`ProcessRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn exists(&self, program: &str) -> bool {
        let program = program.to_string();
        tokio::task::spawn_blocking(move || which::which(program).is_ok())
            .await
            .unwrap_or(false)
    }

    async fn capture(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProbeError> {
        tracing::debug!(program, ?args, "probing");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProbeError::NotFound {
                    program: program.to_string(),
                });
            }
            Ok(Err(e)) => {
                return Err(ProbeError::Io {
                    program: program.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ProbeError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(ProbeError::NonZeroExit {
                program: program.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ProcessOutput { stdout, stderr })
    }
}

/// Installation state of one tool, produced fresh on every probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolProbeResult {
    pub name: String,
    pub installed: bool,
    pub raw_version_output: Option<String>,
}

/// Checks whether `tool` is installed and captures its client version text.
pub async fn probe_tool(runner: &dyn ProcessRunner, tool: CliTool) -> ToolProbeResult {
    let program = tool.binary();
    if !runner.exists(program).await {
        return ToolProbeResult {
            name: program.to_string(),
            installed: false,
            raw_version_output: None,
        };
    }

    let args = vec!["version".to_string(), "--client".to_string()];
    let raw_version_output = match runner.capture(program, &args, LIGHT_PROBE_TIMEOUT).await {
        Ok(output) => Some(output.stdout),
        Err(e) => {
            tracing::debug!("{program} is installed but version probe failed: {e}");
            None
        }
    };

    ToolProbeResult {
        name: program.to_string(),
        installed: true,
        raw_version_output,
    }
}

/// Checks both CLIs for presence.
pub async fn probe_availability(runner: &dyn ProcessRunner) -> ToolAvailability {
    let (kubectl, oc) = tokio::join!(
        runner.exists(CliTool::Kubectl.binary()),
        runner.exists(CliTool::Oc.binary()),
    );
    ToolAvailability { kubectl, oc }
}
