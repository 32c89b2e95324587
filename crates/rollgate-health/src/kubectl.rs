//! Collaborators backed by the `kubectl` binary.
//!
//! Every call spawns `kubectl` through `tokio::process` with
//! `kill_on_drop`, so a cancelled probe does not leave children behind.

use std::process::Output;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

use rollgate_core::ReadinessPolicy;

use crate::collab::{BoxFuture, ExecOutput, PodExec, ReadinessWaiter, ReplicaSource};

/// Replica counts read from a StatefulSet object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatefulSetView {
    /// Declared replicas (`spec.replicas`, 1 when unset).
    pub replicas: u32,
    /// `status.readyReplicas`, 0 when unset.
    pub ready_replicas: u32,
}

#[derive(Deserialize)]
struct StatefulSetDoc {
    spec: StatefulSetSpec,
    #[serde(default)]
    status: StatefulSetStatus,
}

#[derive(Deserialize)]
struct StatefulSetSpec {
    replicas: Option<u32>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatefulSetStatus {
    #[serde(default)]
    ready_replicas: u32,
}

/// Parse the output of `kubectl get statefulset -o json`.
pub fn parse_statefulset(json: &str) -> Result<StatefulSetView, String> {
    let doc: StatefulSetDoc =
        serde_json::from_str(json).map_err(|e| format!("invalid statefulset json: {e}"))?;
    Ok(StatefulSetView {
        replicas: doc.spec.replicas.unwrap_or(1),
        ready_replicas: doc.status.ready_replicas,
    })
}

/// Thin async wrapper around the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    context: Option<String>,
    exec_timeout: Duration,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl Kubectl {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            context: None,
            exec_timeout: Duration::from_secs(30),
        }
    }

    /// Use a specific kubeconfig context instead of the current one.
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Arguments for `kubectl exec` running `command` in `container`.
    pub fn exec_args(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["exec", "-n", namespace, pod, "-c", container, "--"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.extend(command.iter().cloned());
        args
    }

    /// Arguments for fetching a StatefulSet as JSON.
    pub fn get_statefulset_args(&self, namespace: &str, name: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["get", "statefulset", name, "-n", namespace, "-o", "json"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }

    fn base_args(&self) -> Vec<String> {
        match &self.context {
            Some(ctx) => vec!["--context".to_string(), ctx.clone()],
            None => Vec::new(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<Output, String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);

        match tokio::time::timeout(self.exec_timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("failed to run {}: {e}", self.binary)),
            Err(_) => Err(format!("{} timed out after {:?}", self.binary, self.exec_timeout)),
        }
    }

    /// Fetch replica counts of a StatefulSet.
    pub async fn get_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSetView, String> {
        let output = self.run(&self.get_statefulset_args(namespace, name)).await?;
        if !output.status.success() {
            return Err(format!(
                "kubectl get statefulset {namespace}/{name} failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end()
            ));
        }
        parse_statefulset(&String::from_utf8_lossy(&output.stdout))
    }
}

impl PodExec for Kubectl {
    fn exec<'a>(
        &'a self,
        namespace: &'a str,
        pod: &'a str,
        container: &'a str,
        command: &'a [String],
    ) -> BoxFuture<'a, ExecOutput> {
        Box::pin(async move {
            let args = self.exec_args(namespace, pod, container, command);
            match self.run(&args).await {
                Ok(output) => {
                    let error = (!output.status.success())
                        .then(|| format!("command terminated with {}", output.status));
                    ExecOutput {
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                        error,
                    }
                }
                Err(error) => ExecOutput {
                    error: Some(error),
                    ..Default::default()
                },
            }
        })
    }
}

impl ReplicaSource for Kubectl {
    fn replica_count<'a>(
        &'a self,
        namespace: &'a str,
        statefulset: &'a str,
    ) -> BoxFuture<'a, Result<u32, String>> {
        Box::pin(async move {
            self.get_statefulset(namespace, statefulset)
                .await
                .map(|view| view.replicas)
        })
    }
}

/// Polls the StatefulSet until every declared replica reports ready.
#[derive(Debug, Clone)]
pub struct KubectlReadiness {
    kubectl: Kubectl,
    policy: ReadinessPolicy,
}

impl KubectlReadiness {
    pub fn new(kubectl: Kubectl, policy: ReadinessPolicy) -> Self {
        Self { kubectl, policy }
    }
}

impl ReadinessWaiter for KubectlReadiness {
    fn wait_ready<'a>(
        &'a self,
        namespace: &'a str,
        statefulset: &'a str,
        expected: u32,
    ) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            let deadline = Instant::now() + self.policy.timeout;
            loop {
                let last = match self.kubectl.get_statefulset(namespace, statefulset).await {
                    Ok(view) if view.ready_replicas == expected => return Ok(()),
                    Ok(view) => format!("{}/{} replicas ready", view.ready_replicas, expected),
                    Err(e) => e,
                };
                debug!(%namespace, %statefulset, expected, status = %last, "statefulset not ready");

                if Instant::now() + self.policy.poll_interval > deadline {
                    return Err(format!(
                        "statefulset {namespace}/{statefulset} not ready after {:?}: {last}",
                        self.policy.timeout
                    ));
                }
                tokio::time::sleep(self.policy.poll_interval).await;
            }
        })
    }
}
