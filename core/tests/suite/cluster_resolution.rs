use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use kubeassist_core::CliResolver;
use kubeassist_core::CliTool;
use kubeassist_core::ClusterTarget;
use kubeassist_core::ClusterTypeDetector;
use kubeassist_core::cluster::ClusterDialect;
use kubeassist_core::cluster::HostingEnvironment;
use kubeassist_core::cluster::ProbeError;
use kubeassist_core::cluster::ProcessOutput;
use kubeassist_core::cluster::ProcessRunner;
use pretty_assertions::assert_eq;

/// Answers from a fixed table and records every call.
struct TableRunner {
    installed: Vec<&'static str>,
    table: HashMap<String, &'static str>,
    log: Mutex<Vec<String>>,
}

impl TableRunner {
    fn new(installed: Vec<&'static str>, table: &[(&str, &'static str)]) -> Arc<Self> {
        Arc::new(Self {
            installed,
            table: table.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            log: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessRunner for TableRunner {
    async fn exists(&self, program: &str) -> bool {
        self.log.lock().unwrap().push(format!("which {program}"));
        self.installed.contains(&program)
    }

    async fn capture(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<ProcessOutput, ProbeError> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.log.lock().unwrap().push(line.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        match self.table.get(&line) {
            Some(stdout) => Ok(ProcessOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
            None => Err(ProbeError::NonZeroExit {
                program: program.to_string(),
                code: 1,
                stderr: format!("unscripted: {line}"),
            }),
        }
    }
}

const PLAIN_API_VERSIONS: &str = "apps/v1\nbatch/v1\nnetworking.k8s.io/v1\nv1\n";

#[tokio::test]
async fn generic_cluster_without_oc_resolves_to_kubectl_once() {
    let runner = TableRunner::new(
        vec!["kubectl"],
        &[
            ("kubectl api-versions", PLAIN_API_VERSIONS),
            ("kubectl get nodes -o json", r#"{"items": []}"#),
        ],
    );
    let detector = Arc::new(ClusterTypeDetector::new(
        runner.clone(),
        ClusterTarget::default(),
    ));

    let detection = detector.detect().await.unwrap();
    assert_eq!(detection.dialect, ClusterDialect::Kubernetes);
    assert_eq!(detection.hosting_environment, HostingEnvironment::Unknown);

    let resolver = CliResolver::new(detector);
    assert_eq!(resolver.resolve(None).await, CliTool::Kubectl);
    let after_first = runner.calls();

    assert_eq!(resolver.resolve(None).await, CliTool::Kubectl);
    assert_eq!(runner.calls(), after_first);
}

#[tokio::test]
async fn openshift_groups_prefer_oc_and_context_switch_redetects() {
    let runner = TableRunner::new(
        vec!["kubectl", "oc"],
        &[(
            "kubectl --context prod api-versions",
            "apps/v1\nroute.openshift.io/v1\nv1\n",
        )],
    );
    let target = ClusterTarget {
        context: Some("prod".to_string()),
        ..Default::default()
    };
    let resolver = CliResolver::new(Arc::new(ClusterTypeDetector::new(runner.clone(), target)));

    assert_eq!(resolver.resolve(None).await, CliTool::Oc);
    assert_eq!(resolver.cached(), Some(CliTool::Oc));

    resolver.invalidate();
    assert_eq!(resolver.cached(), None);
    let before = runner.calls();
    assert_eq!(resolver.resolve(None).await, CliTool::Oc);
    assert!(runner.calls() > before);
}

#[tokio::test]
async fn explicit_choice_skips_detection() {
    let runner = TableRunner::new(vec!["kubectl"], &[]);
    let resolver = CliResolver::new(Arc::new(ClusterTypeDetector::new(
        runner.clone(),
        ClusterTarget::default(),
    )));

    assert_eq!(resolver.resolve(Some(CliTool::Oc)).await, CliTool::Oc);
    assert_eq!(runner.calls(), 0);
    assert_eq!(resolver.cached(), None);
}

#[tokio::test]
async fn unreachable_cluster_degrades_to_kubectl() {
    let runner = TableRunner::new(vec!["kubectl"], &[]);
    let resolver = CliResolver::new(Arc::new(ClusterTypeDetector::new(
        runner,
        ClusterTarget::default(),
    )));
    assert_eq!(resolver.resolve(None).await, CliTool::Kubectl);
}
