//! rollgate-health: the health gate between two pod restarts of a rolling update.
//!
//! After a pod of a replicated, partitioned database restarts, some ranges
//! only have copies on the other pods until they re-replicate. The gate
//! waits until every pod reports `ranges_underreplicated` at zero before
//! the rollout may restart the next pod.
//!
//! # Architecture
//!
//! ```text
//! HealthChecker::probe
//!   ├── ReplicaSource::replica_count   (topology)
//!   ├── ReadinessWaiter::wait_ready    (replica set ready)
//!   ├── PodChecker::sweep_fleet        (pre-check, tool detection)
//!   └── retry(BackoffPolicy)           (first poll, settle, second poll)
//!         └── PodChecker::sweep_fleet
//!               └── PodChecker::check_pod
//!                     ├── PodExec::exec  (curl _status/vars | grep)
//!                     └── metric::extract_all
//! ```
//!
//! # Fallback
//!
//! Images without `curl` cannot be scraped. When the pre-check sees the
//! missing-tool marker on stderr, the probe waits a fixed delay instead of
//! polling and then lets the rollout continue.

pub mod backoff;
pub mod checker;
pub mod collab;
pub mod error;
pub mod kubectl;
pub mod metric;
pub mod probe;
pub mod shutdown;

pub use backoff::{RetryError, RetryStats, retry};
pub use checker::{CheckFailure, PodChecker};
pub use collab::{BoxFuture, ExecOutput, PodExec, ReadinessWaiter, ReplicaSource};
pub use error::{ProbeError, ProbeResult, Stage};
pub use kubectl::{Kubectl, KubectlReadiness};
pub use metric::{MetricSample, ParseError};
pub use probe::{HealthChecker, HealthGate, ProbeOutcome};
pub use shutdown::{Cancelled, Shutdown};
