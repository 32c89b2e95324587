//! Probe error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::checker::CheckFailure;

/// Which convergence poll gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The poll right after readiness.
    First,
    /// The poll after the settle delay.
    Second,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::First => f.write_str("first"),
            Stage::Second => f.write_str("second"),
        }
    }
}

/// Errors that stop a rollout at the current replica.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read replica count of {fleet}: {reason}")]
    Topology { fleet: String, reason: String },

    #[error("error rolling update strategy on pod {replica}: {reason}")]
    Readiness { replica: u32, reason: String },

    #[error(
        "replicas check probe failed for cluster {label} after restarting pod {replica} \
         ({stage} check, {attempts} attempts in {elapsed:?}): {last}"
    )]
    NotConverged {
        label: String,
        replica: u32,
        stage: Stage,
        attempts: u32,
        elapsed: Duration,
        #[source]
        last: CheckFailure,
    },

    #[error("health check probe cancelled")]
    Cancelled,
}

pub type ProbeResult<T> = Result<T, ProbeError>;

impl From<crate::shutdown::Cancelled> for ProbeError {
    fn from(_: crate::shutdown::Cancelled) -> Self {
        ProbeError::Cancelled
    }
}
