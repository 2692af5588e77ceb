//! `kubeassist` command-line front-end.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use kubeassist_core::CliTool;
use kubeassist_core::ConfigLoader;
use kubeassist_core::ConfigOverrides;

mod auth_cmd;
mod cluster_cmd;
mod model_cmd;
mod session;

pub use auth_cmd::AuthCli;
pub use auth_cmd::AuthCommand;
pub use cluster_cmd::DetectArgs;
pub use cluster_cmd::KubectlArgs;
pub use cluster_cmd::ResolveArgs;
pub use cluster_cmd::VersionsArgs;
pub use model_cmd::AskArgs;
pub use model_cmd::ProvidersArgs;
pub use session::Session;

#[derive(Debug, Parser)]
#[command(
    name = "kubeassist",
    version,
    about = "Kubernetes and OpenShift assistant that picks the right CLI and model backend"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags that override every configuration layer.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Send cluster commands through this CLI (`kubectl` or `oc`) instead of
    /// detecting the cluster dialect.
    #[arg(long = "cli", value_name = "TOOL", global = true)]
    pub cli: Option<CliTool>,

    /// Kubeconfig context to target.
    #[arg(long = "context", global = true)]
    pub context: Option<String>,

    /// Namespace for namespaced commands.
    #[arg(long = "namespace", short = 'n', global = true)]
    pub namespace: Option<String>,

    /// Path to the kubeconfig file.
    #[arg(long = "kubeconfig", value_name = "PATH", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Model provider id (see `kubeassist providers`).
    #[arg(long = "provider", value_name = "ID", global = true)]
    pub provider: Option<String>,

    /// Model identifier passed to the provider.
    #[arg(long = "model", short = 'm', global = true)]
    pub model: Option<String>,

    /// Log debug output to stderr.
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            cli: self.cli,
            context: self.context.clone(),
            namespace: self.namespace.clone(),
            kubeconfig: self.kubeconfig.clone(),
            model_provider: self.provider.clone(),
            model: self.model.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Detect the cluster dialect and hosting environment.
    Detect(DetectArgs),

    /// Print the CLI that cluster commands are sent through.
    Resolve(ResolveArgs),

    /// Report installed CLI versions and their compatibility with the server.
    Versions(VersionsArgs),

    /// Run a command through the resolved CLI with the configured connection flags.
    #[command(name = "kubectl", visible_alias = "k")]
    Kubectl(KubectlArgs),

    /// List configured model providers.
    Providers(ProvidersArgs),

    /// Send one prompt to the selected model provider.
    Ask(AskArgs),

    /// Manage the GitHub credential used by the Copilot provider.
    Auth(AuthCli),
}

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = ConfigLoader::new()
        .load(cli.global.overrides())
        .context("failed to load configuration")?;
    let session = Session::new(config);

    match cli.command {
        Command::Detect(args) => cluster_cmd::run_detect(&session, args).await?,
        Command::Resolve(args) => cluster_cmd::run_resolve(&session, args).await?,
        Command::Versions(args) => cluster_cmd::run_versions(&session, args).await?,
        Command::Kubectl(args) => return cluster_cmd::run_passthrough(&session, args).await,
        Command::Providers(args) => model_cmd::run_providers(&session, args)?,
        Command::Ask(args) => model_cmd::run_ask(&session, args).await?,
        Command::Auth(cli) => cli.run(&session).await?,
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kubeassist").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn global_flags_apply_after_subcommand() {
        let cli = parse(&["resolve", "--cli", "OC", "--context", "prod", "-n", "payments"]);
        let overrides = cli.global.overrides();
        assert_eq!(overrides.cli, Some(CliTool::Oc));
        assert_eq!(overrides.context.as_deref(), Some("prod"));
        assert_eq!(overrides.namespace.as_deref(), Some("payments"));
        assert!(matches!(cli.command, Command::Resolve(_)));
    }

    #[test]
    fn unknown_cli_is_rejected() {
        let err = Cli::try_parse_from(["kubeassist", "--cli", "helm", "resolve"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn passthrough_keeps_hyphenated_args() {
        let cli = parse(&["-n", "web", "kubectl", "--", "get", "pods", "-o", "wide"]);
        let Command::Kubectl(args) = cli.command else {
            panic!("expected kubectl subcommand");
        };
        assert_eq!(args.args, vec!["get", "pods", "-o", "wide"]);
        assert_eq!(cli.global.namespace.as_deref(), Some("web"));
    }

    #[test]
    fn passthrough_requires_arguments() {
        assert!(Cli::try_parse_from(["kubeassist", "kubectl"]).is_err());
    }

    #[test]
    fn ask_joins_words_and_takes_model_overrides() {
        let cli = parse(&[
            "ask", "--provider", "ollama", "-m", "llama3.2", "why", "is", "my", "pod", "pending?",
        ]);
        let Command::Ask(args) = &cli.command else {
            panic!("expected ask subcommand");
        };
        assert_eq!(args.prompt(), "why is my pod pending?");
        let overrides = cli.global.overrides();
        assert_eq!(overrides.model_provider.as_deref(), Some("ollama"));
        assert_eq!(overrides.model.as_deref(), Some("llama3.2"));
    }

    #[test]
    fn auth_subcommands() {
        let cli = parse(&["auth", "status", "--json"]);
        let Command::Auth(auth) = cli.command else {
            panic!("expected auth subcommand");
        };
        assert!(matches!(auth.command, AuthCommand::Status(ref args) if args.json));
    }
}
