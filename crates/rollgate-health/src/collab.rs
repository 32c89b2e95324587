//! Collaborator seams: remote exec, readiness wait, topology lookup.
//!
//! The probe never talks to the orchestrator directly. Each interaction
//! goes through one of these traits so tests can script replies and the
//! binary can plug in the `kubectl` implementations from [`crate::kubectl`].

use std::future::Future;
use std::pin::Pin;

/// Boxed future alias used by every collaborator trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a remote command produced.
///
/// `error` is set when the transport itself failed (spawn failure,
/// non-zero exit). Stderr is kept separately because the checker looks
/// at it before looking at `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl ExecOutput {
    /// A clean run that printed `stdout`.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }
}

/// Runs a command inside a container of a replica pod.
pub trait PodExec: Send + Sync {
    fn exec<'a>(
        &'a self,
        namespace: &'a str,
        pod: &'a str,
        container: &'a str,
        command: &'a [String],
    ) -> BoxFuture<'a, ExecOutput>;
}

/// Blocks until the replica set reports `expected` ready replicas.
pub trait ReadinessWaiter: Send + Sync {
    fn wait_ready<'a>(
        &'a self,
        namespace: &'a str,
        statefulset: &'a str,
        expected: u32,
    ) -> BoxFuture<'a, Result<(), String>>;
}

/// Reads the declared replica count of the replica set.
pub trait ReplicaSource: Send + Sync {
    fn replica_count<'a>(
        &'a self,
        namespace: &'a str,
        statefulset: &'a str,
    ) -> BoxFuture<'a, Result<u32, String>>;
}
