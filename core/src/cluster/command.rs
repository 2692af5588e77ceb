//! Typed construction of `kubectl` / `oc` invocations.
//!
//! All flag ordering lives in [`CliCommand::to_args`]: connection flags
//! first (`--kubeconfig`, `--context`, namespace scope), then the subcommand
//! words, then `-o json` when structured output is requested.

use std::path::PathBuf;
use std::time::Duration;

use super::ClusterTarget;
use super::CliTool;
use super::probe::ProbeError;
use super::probe::ProcessOutput;
use super::probe::ProcessRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    Named(String),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliCommand {
    tool: CliTool,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
    namespace: Option<NamespaceScope>,
    subcommand: Vec<String>,
    json_output: bool,
}

impl CliCommand {
    pub fn new(tool: CliTool) -> Self {
        Self {
            tool,
            kubeconfig: None,
            context: None,
            namespace: None,
            subcommand: Vec::new(),
            json_output: false,
        }
    }

    /// Applies the connection flags from `target`. Values already set on the
    /// builder are kept.
    pub fn target(mut self, target: &ClusterTarget) -> Self {
        if self.kubeconfig.is_none() {
            self.kubeconfig = target.kubeconfig.clone();
        }
        if self.context.is_none() {
            self.context = target.context.clone();
        }
        if self.namespace.is_none() {
            self.namespace = target.namespace.clone().map(NamespaceScope::Named);
        }
        self
    }

    pub fn kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(NamespaceScope::Named(namespace.into()));
        self
    }

    pub fn all_namespaces(mut self) -> Self {
        self.namespace = Some(NamespaceScope::All);
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.subcommand.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subcommand.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn tool(&self) -> CliTool {
        self.tool
    }

    pub fn program(&self) -> &'static str {
        self.tool.binary()
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.subcommand.len() + 7);
        if let Some(path) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        match &self.namespace {
            Some(NamespaceScope::Named(ns)) => {
                args.push("--namespace".to_string());
                args.push(ns.clone());
            }
            Some(NamespaceScope::All) => args.push("--all-namespaces".to_string()),
            None => {}
        }
        args.extend(self.subcommand.iter().cloned());
        if self.json_output {
            args.push("-o".to_string());
            args.push("json".to_string());
        }
        args
    }

    /// Shell-quoted rendering for logs and error messages.
    pub fn display(&self) -> String {
        let words: Vec<String> = std::iter::once(self.program().to_string())
            .chain(self.to_args())
            .collect();
        shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
    }

    pub async fn capture(
        &self,
        runner: &dyn ProcessRunner,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProbeError> {
        runner
            .capture(self.program(), &self.to_args(), timeout)
            .await
    }

    /// Runs the command and parses stdout as JSON.
    pub async fn capture_json(
        &self,
        runner: &dyn ProcessRunner,
        timeout: Duration,
    ) -> Result<serde_json::Value, ProbeError> {
        let output = self.capture(runner, timeout).await?;
        serde_json::from_str(&output.stdout).map_err(|e| ProbeError::InvalidOutput {
            program: self.program().to_string(),
            message: e.to_string(),
        })
    }
}
