//! Per-pod metric checks and the fleet sweep.
//!
//! A check scrapes `_status/vars` from inside the pod and classifies the
//! result. The sweep walks the fleet from the highest ordinal down, the
//! order a StatefulSet rolling update restarts pods in, and stops at the
//! first pod that is not converged.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use rollgate_core::{FleetSpec, UNDER_REPLICATED_PREFIX};

use crate::collab::PodExec;
use crate::metric::{self, ParseError};

/// Why a pod (and therefore the fleet) is not converged yet.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckFailure {
    /// The metric parsed but some store still has under-replicated ranges.
    #[error("under replicated ranges not zero on pod {pod} (store {store}): {value}")]
    NotConverged {
        pod: String,
        replica: u32,
        store: String,
        value: f64,
    },

    /// The scrape came back but could not be read as a metric.
    #[error("unreadable metric on pod {pod}: {error}")]
    Unreadable {
        pod: String,
        #[source]
        error: ParseError,
    },

    /// The image has no scrape tool, so convergence cannot be observed.
    #[error("exec in pod {pod} failed, scrape tool missing: {stderr}")]
    ToolUnavailable { pod: String, stderr: String },

    /// The exec transport failed or the command wrote to stderr.
    #[error("exec in pod {pod} failed: {reason}")]
    TransportFailure { pod: String, reason: String },
}

impl CheckFailure {
    /// Pod the failure was observed on.
    pub fn pod(&self) -> &str {
        match self {
            Self::NotConverged { pod, .. }
            | Self::Unreadable { pod, .. }
            | Self::ToolUnavailable { pod, .. }
            | Self::TransportFailure { pod, .. } => pod,
        }
    }

    /// Short machine-friendly tag, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConverged { .. } => "not_converged",
            Self::Unreadable { .. } => "unreadable",
            Self::ToolUnavailable { .. } => "tool_unavailable",
            Self::TransportFailure { .. } => "transport_failure",
        }
    }

    pub fn is_tool_unavailable(&self) -> bool {
        matches!(self, Self::ToolUnavailable { .. })
    }
}

/// Scrapes the under-replicated metric from pods of one fleet.
#[derive(Clone)]
pub struct PodChecker {
    exec: Arc<dyn PodExec>,
    fleet: FleetSpec,
    tool_missing_marker: String,
}

impl PodChecker {
    pub fn new(exec: Arc<dyn PodExec>, fleet: FleetSpec, tool_missing_marker: &str) -> Self {
        Self {
            exec,
            fleet,
            tool_missing_marker: tool_missing_marker.to_string(),
        }
    }

    pub fn with_tool_missing_marker(mut self, marker: &str) -> Self {
        self.tool_missing_marker = marker.to_string();
        self
    }

    pub fn fleet(&self) -> &FleetSpec {
        &self.fleet
    }

    /// Shell command run inside `pod` to fetch the metric lines.
    pub fn scrape_command(&self, pod: &str) -> Vec<String> {
        vec![
            "/bin/bash".to_string(),
            "-c".to_string(),
            format!(
                "curl -ks {} | grep 'ranges_underreplicated{{'",
                self.fleet.vars_url(pod)
            ),
        ]
    }

    /// Check the pod at ordinal `replica`.
    pub async fn check_pod(&self, replica: u32) -> Result<(), CheckFailure> {
        let pod = self.fleet.pod_name(replica);
        let command = self.scrape_command(&pod);
        debug!(%pod, replica, cmd = ?command, "scraping ranges_underreplicated");

        let output = self
            .exec
            .exec(&self.fleet.namespace, &pod, &self.fleet.container, &command)
            .await;

        // The missing-tool marker must win over the generic stderr case.
        if !self.tool_missing_marker.is_empty()
            && output.stderr.contains(&self.tool_missing_marker)
        {
            debug!(%pod, "scrape tool not found in image");
            return Err(CheckFailure::ToolUnavailable {
                pod,
                stderr: output.stderr,
            });
        }
        if !output.stderr.is_empty() {
            return Err(CheckFailure::TransportFailure {
                pod,
                reason: format!("stderr: {}", output.stderr.trim_end()),
            });
        }
        if let Some(error) = output.error {
            return Err(CheckFailure::TransportFailure { pod, reason: error });
        }

        let samples = match metric::extract_all(&output.stdout, UNDER_REPLICATED_PREFIX, replica) {
            Ok(samples) => samples,
            Err(error) => {
                debug!(%pod, %error, output = %output.stdout, "metric not readable");
                return Err(CheckFailure::Unreadable { pod, error });
            }
        };
        debug!(%pod, stores = samples.len(), output = %output.stdout.trim_end(), "metric read");

        match samples.into_iter().find(|s| !s.is_converged()) {
            Some(sample) => {
                debug!(%pod, store = %sample.store_label, under_replicated = sample.value, "metric is greater than 0");
                Err(CheckFailure::NotConverged {
                    pod,
                    replica,
                    store: sample.store_label,
                    value: sample.value,
                })
            }
            None => Ok(()),
        }
    }

    /// Check every pod, highest ordinal first, stopping at the first failure.
    pub async fn sweep_fleet(&self, replicas: u32) -> Result<(), CheckFailure> {
        debug!(fleet = %self.fleet.qualified_name(), replicas, "sweeping fleet");
        for replica in (0..replicas).rev() {
            self.check_pod(replica).await?;
        }
        Ok(())
    }
}
