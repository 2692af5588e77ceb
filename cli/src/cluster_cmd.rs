//! `detect`, `resolve`, `versions` and the `kubectl` passthrough.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use kubeassist_core::CliTool;
use kubeassist_core::ClusterDetectionResult;
use kubeassist_core::cluster::CliCommand;
use kubeassist_core::cluster::CliVersionInfo;
use kubeassist_core::cluster::ResolvedCliChoice;
use kubeassist_core::cluster::version_info::cli_version_info;
use tracing::debug;
use tracing::warn;

use crate::session::Session;

#[derive(Debug, Parser)]
pub struct DetectArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ResolveArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct VersionsArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct KubectlArgs {
    /// Arguments passed to the CLI after the connection flags.
    #[arg(
        value_name = "ARGS",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,
}

pub async fn run_detect(session: &Session, args: DetectArgs) -> anyhow::Result<()> {
    let result = match session.detector().detect().await {
        Ok(result) => result,
        Err(err) => {
            warn!(%err, "falling back to plain Kubernetes");
            ClusterDetectionResult::degraded_default()
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    println!("Dialect:      {}", result.dialect);
    println!("Hosting:      {}", result.hosting_environment);
    if let Some(label) = &result.distribution_label {
        println!("Distribution: {label}");
    }
    if let Some(version) = &result.reported_version {
        println!("Version:      {version}");
    }
    Ok(())
}

pub async fn run_resolve(session: &Session, args: ResolveArgs) -> anyhow::Result<()> {
    let tool = session.resolve_cli().await;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ResolvedCliChoice { tool })?
        );
    } else {
        println!("{tool}");
    }
    Ok(())
}

pub async fn run_versions(session: &Session, args: VersionsArgs) -> anyhow::Result<()> {
    let target = &session.config().target;
    let mut report = Vec::new();
    for tool in [CliTool::Kubectl, CliTool::Oc] {
        report.push(cli_version_info(session.runner(), tool, target).await);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for info in &report {
        print_version_info(info);
    }
    Ok(())
}

fn print_version_info(info: &CliVersionInfo) {
    if !info.installed {
        println!("{}: not installed", info.tool_name);
        if let Some(hint) = &info.acquisition_hint {
            println!("  install from {hint}");
        }
        return;
    }

    let client = info.client_version.as_deref().unwrap_or("unknown");
    let server = info.server_version.as_deref().unwrap_or("unreachable");
    println!("{}: client {client}, server {server}", info.tool_name);
    if info.server_version.is_some() && !info.versions_compatible {
        println!("  client is outside the supported skew of the server");
    }
    if !info.upgrade_available {
        return;
    }
    if let Some(recommended) = &info.recommended_version {
        println!("  upgrade available: {recommended}");
    }
    if let Some(hint) = &info.acquisition_hint {
        println!("  download from {hint}");
    }
}

/// Runs the resolved CLI with inherited stdio and mirrors its exit status.
pub async fn run_passthrough(session: &Session, args: KubectlArgs) -> anyhow::Result<ExitCode> {
    let tool = session.resolve_cli().await;
    let command = CliCommand::new(tool)
        .target(&session.config().target)
        .args(args.args);
    debug!(command = %command.display(), "running");

    let status = match tokio::process::Command::new(command.program())
        .args(command.to_args())
        .status()
        .await
    {
        Ok(status) => status,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            anyhow::bail!(
                "`{}` is not installed or not on PATH. Install it from {}",
                tool.binary(),
                tool.acquisition_hint()
            );
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to run {}", command.display()));
        }
    };

    Ok(status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE))
}
