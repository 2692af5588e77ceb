//! Client/server version report for one CLI.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;
use serde_json::Value;

use super::ClusterTarget;
use super::CliTool;
use super::command::CliCommand;
use super::probe::LIGHT_PROBE_TIMEOUT;
use super::probe::ProcessRunner;
use super::version::Version;

static CLIENT_VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Client Version:\s*v?(\d+\.\d+\.\d+)").ok());
static SERVER_VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Server Version:\s*v?(\d+\.\d+\.\d+)").ok());

/// Recomputed on demand; never cached beyond one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliVersionInfo {
    pub tool_name: String,
    pub installed: bool,
    pub client_version: Option<String>,
    pub server_version: Option<String>,
    pub versions_compatible: bool,
    pub upgrade_available: bool,
    pub recommended_version: Option<String>,
    pub acquisition_hint: Option<String>,
}

pub async fn cli_version_info(
    runner: &dyn ProcessRunner,
    tool: CliTool,
    target: &ClusterTarget,
) -> CliVersionInfo {
    let mut info = CliVersionInfo {
        tool_name: tool.binary().to_string(),
        installed: false,
        client_version: None,
        server_version: None,
        versions_compatible: false,
        upgrade_available: false,
        recommended_version: None,
        acquisition_hint: Some(tool.acquisition_hint().to_string()),
    };

    if !runner.exists(tool.binary()).await {
        return info;
    }
    info.installed = true;

    // `version` exits non-zero when the server is unreachable but still
    // prints the client half, so a failure falls back to `--client`.
    let output = match CliCommand::new(tool)
        .target(target)
        .arg("version")
        .json()
        .capture(runner, LIGHT_PROBE_TIMEOUT)
        .await
    {
        Ok(output) => output.stdout,
        Err(e) => {
            tracing::debug!("{} version failed: {e}", tool.binary());
            CliCommand::new(tool)
                .args(["version", "--client"])
                .capture(runner, LIGHT_PROBE_TIMEOUT)
                .await
                .map(|output| output.stdout)
                .unwrap_or_default()
        }
    };

    let (client, server) = parse_versions(&output);
    info.client_version = client.map(|v| v.to_string());
    info.server_version = server.map(|v| v.to_string());

    match (client, server) {
        (Some(client), Some(server)) => {
            info.versions_compatible = client.is_compatible_with(&server);
            info.upgrade_available = client < server;
            if !info.versions_compatible || info.upgrade_available {
                info.recommended_version = Some(server.to_string());
            } else {
                info.acquisition_hint = None;
            }
        }
        (Some(_), None) => info.acquisition_hint = None,
        _ => {}
    }

    info
}

/// Extracts client and server versions from JSON `version -o json` output,
/// falling back to the legacy `Client Version: vX.Y.Z` text form.
pub fn parse_versions(output: &str) -> (Option<Version>, Option<Version>) {
    if let Ok(json) = serde_json::from_str::<Value>(output) {
        let version_at = |pointer: &str| {
            json.pointer(pointer)
                .and_then(Value::as_str)
                .and_then(Version::parse)
        };
        return (
            version_at("/clientVersion/gitVersion"),
            version_at("/serverVersion/gitVersion"),
        );
    }

    let capture = |re: &Option<Regex>| {
        re.as_ref()
            .and_then(|re| re.captures(output))
            .and_then(|caps| caps.get(1))
            .and_then(|m| Version::parse(m.as_str()))
    };
    (capture(&CLIENT_VERSION_RE), capture(&SERVER_VERSION_RE))
}
