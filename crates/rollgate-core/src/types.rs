//! Shared types used across rollgate crates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Label prefix of the under-replicated ranges gauge in `_status/vars`.
pub const UNDER_REPLICATED_PREFIX: &str = "ranges_underreplicated{store=\"";

/// Substring of stderr emitted when `curl` is missing from the image.
pub const DEFAULT_TOOL_MISSING_MARKER: &str = "curl: command not found";

/// Container that runs the database process in each replica pod.
pub const DEFAULT_CONTAINER: &str = "db";

/// Identity of the replica set being rolled.
///
/// Pod names are derived as `<statefulset>-<index>`, matching how a
/// StatefulSet names its pods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSpec {
    pub namespace: String,
    pub statefulset: String,
    /// Headless service fronting the pods. Used as the DNS suffix of the
    /// scrape URL.
    pub service: String,
    pub container: String,
    pub http_port: u16,
}

impl FleetSpec {
    /// Create a fleet whose service shares the statefulset's name.
    pub fn new(namespace: &str, statefulset: &str, http_port: u16) -> Self {
        Self {
            namespace: namespace.to_string(),
            statefulset: statefulset.to_string(),
            service: statefulset.to_string(),
            container: DEFAULT_CONTAINER.to_string(),
            http_port,
        }
    }

    /// Name of the pod at `index`.
    pub fn pod_name(&self, index: u32) -> String {
        format!("{}-{}", self.statefulset, index)
    }

    /// URL of the metrics endpoint served by `pod`.
    pub fn vars_url(&self, pod: &str) -> String {
        format!("https://{}.{}:{}/_status/vars", pod, self.service, self.http_port)
    }

    /// `namespace/statefulset`, for log lines and error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.statefulset)
    }
}

/// Exponential backoff parameters for a convergence poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Wait after the first failed attempt.
    pub initial_interval: Duration,
    /// Growth factor applied to the wait after every failed attempt.
    pub multiplier: f64,
    /// Upper bound on a single wait.
    pub max_interval: Duration,
    /// Wall-clock budget measured from the first attempt.
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(3 * 60),
        }
    }
}

impl BackoffPolicy {
    /// The wait that follows `current`, capped at `max_interval`.
    ///
    /// Saturates at `max_interval` when the product does not fit a `Duration`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }
}

/// Timing and detection knobs for a single probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbePolicy {
    pub backoff: BackoffPolicy,
    /// Wait between the first and second convergence checks.
    pub settle_delay: Duration,
    /// Wait substituted for polling when the scrape tool is missing.
    pub fallback_delay: Duration,
    pub tool_missing_marker: String,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            settle_delay: Duration::from_secs(22),
            fallback_delay: Duration::from_secs(60),
            tool_missing_marker: DEFAULT_TOOL_MISSING_MARKER.to_string(),
        }
    }
}

/// How long to wait for the replica set to report every pod ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.trim().parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.trim().parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
