//! Health-gating probe: the decision run between two pod restarts.
//!
//! ```text
//! topology ─► readiness ─► pre-check sweep ─┬─ tool missing ─► fallback delay ─► Done
//!                                            └─► poll ─► settle delay ─► poll ─► Done
//! ```
//!
//! Each poll is a [`retry`] of a full fleet sweep. Exhausting either poll
//! fails the probe, and the caller must halt the rollout at the current pod.

use std::sync::Arc;

use tracing::{debug, info, warn};

use rollgate_core::{FleetSpec, ProbePolicy};

use crate::backoff::{RetryError, retry};
use crate::checker::PodChecker;
use crate::collab::{BoxFuture, PodExec, ReadinessWaiter, ReplicaSource};
use crate::error::{ProbeError, ProbeResult, Stage};
use crate::shutdown::Shutdown;

/// How a successful probe reached its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Both polls saw zero under-replicated ranges on every pod.
    Converged,
    /// The scrape tool is missing; the fallback delay stood in for polling.
    ToolUnavailable,
}

/// A gate the rollout loop consults before restarting the next pod.
pub trait HealthGate: Send + Sync {
    fn probe<'a>(
        &'a self,
        label: &'a str,
        replica: u32,
        shutdown: Shutdown,
    ) -> BoxFuture<'a, ProbeResult<ProbeOutcome>>;
}

/// Checks that ranges finished re-replicating across a fleet.
pub struct HealthChecker {
    checker: PodChecker,
    readiness: Arc<dyn ReadinessWaiter>,
    topology: Arc<dyn ReplicaSource>,
    policy: ProbePolicy,
}

impl HealthChecker {
    /// Create a checker with the default policy.
    pub fn new(
        fleet: FleetSpec,
        exec: Arc<dyn PodExec>,
        readiness: Arc<dyn ReadinessWaiter>,
        topology: Arc<dyn ReplicaSource>,
    ) -> Self {
        let policy = ProbePolicy::default();
        Self {
            checker: PodChecker::new(exec, fleet, &policy.tool_missing_marker),
            readiness,
            topology,
            policy,
        }
    }

    /// Replace the timing policy (tests use short delays).
    pub fn with_policy(mut self, policy: ProbePolicy) -> Self {
        self.checker = self.checker.with_tool_missing_marker(&policy.tool_missing_marker);
        self.policy = policy;
        self
    }

    /// Run the full probe after pod `replica` was restarted.
    ///
    /// `Ok` means the next pod may be restarted. `label` only tags logs
    /// and errors.
    pub async fn probe(
        &self,
        label: &str,
        replica: u32,
        mut shutdown: Shutdown,
    ) -> ProbeResult<ProbeOutcome> {
        let fleet = self.checker.fleet();
        info!(label, replica, fleet = %fleet.qualified_name(), "health check probe");

        let replicas = shutdown
            .run(self.topology.replica_count(&fleet.namespace, &fleet.statefulset))
            .await?
            .map_err(|reason| ProbeError::Topology {
                fleet: fleet.qualified_name(),
                reason,
            })?;

        shutdown
            .run(self.readiness.wait_ready(&fleet.namespace, &fleet.statefulset, replicas))
            .await?
            .map_err(|reason| ProbeError::Readiness { replica, reason })?;
        debug!(label, replica, replicas, "replica set ready to serve");

        // One unconditional sweep tells us whether the image can be scraped at all.
        match shutdown.run(self.checker.sweep_fleet(replicas)).await? {
            Err(failure) if failure.is_tool_unavailable() => {
                warn!(
                    label,
                    replica,
                    pod = failure.pod(),
                    fallback = ?self.policy.fallback_delay,
                    "scrape tool not installed, falling back to fixed delay"
                );
                shutdown.sleep(self.policy.fallback_delay).await?;
                return Ok(ProbeOutcome::ToolUnavailable);
            }
            Err(failure) => {
                debug!(label, replica, kind = failure.kind(), error = %failure, "pre-check not converged");
            }
            Ok(()) => debug!(label, replica, "pre-check converged"),
        }

        self.poll(label, replica, replicas, Stage::First, &mut shutdown)
            .await?;

        // Evictions can lag the metric settling, so look again after a pause.
        debug!(label, replica, settle = ?self.policy.settle_delay, "waiting before second check");
        shutdown.sleep(self.policy.settle_delay).await?;

        self.poll(label, replica, replicas, Stage::Second, &mut shutdown)
            .await?;

        info!(label, replica, "under replicated ranges converged");
        Ok(ProbeOutcome::Converged)
    }

    async fn poll(
        &self,
        label: &str,
        replica: u32,
        replicas: u32,
        stage: Stage,
        shutdown: &mut Shutdown,
    ) -> ProbeResult<()> {
        let result = retry(&self.policy.backoff, shutdown, || {
            self.checker.sweep_fleet(replicas)
        })
        .await;

        match result {
            Ok(stats) => {
                debug!(label, replica, %stage, attempts = stats.attempts, elapsed = ?stats.elapsed, "fleet converged");
                Ok(())
            }
            Err(RetryError::Cancelled) => Err(ProbeError::Cancelled),
            Err(RetryError::Exhausted {
                attempts,
                elapsed,
                last,
            }) => {
                warn!(label, replica, %stage, attempts, kind = last.kind(), error = %last, "fleet did not converge");
                Err(ProbeError::NotConverged {
                    label: label.to_string(),
                    replica,
                    stage,
                    attempts,
                    elapsed,
                    last,
                })
            }
        }
    }
}

impl HealthGate for HealthChecker {
    fn probe<'a>(
        &'a self,
        label: &'a str,
        replica: u32,
        shutdown: Shutdown,
    ) -> BoxFuture<'a, ProbeResult<ProbeOutcome>> {
        Box::pin(HealthChecker::probe(self, label, replica, shutdown))
    }
}
