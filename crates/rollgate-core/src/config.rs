//! rollgate.toml configuration parser.

use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::types::{
    BackoffPolicy, DEFAULT_CONTAINER, FleetSpec, ProbePolicy, ReadinessPolicy, parse_duration,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    pub fleet: Option<FleetConfig>,
    pub policy: Option<PolicyConfig>,
    pub readiness: Option<ReadinessConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    pub namespace: Option<String>,
    pub statefulset: Option<String>,
    pub http_port: Option<u16>,
    pub container: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub initial_interval: Option<String>,
    pub multiplier: Option<f64>,
    pub max_interval: Option<String>,
    pub max_elapsed: Option<String>,
    pub settle_delay: Option<String>,
    pub fallback_delay: Option<String>,
    pub tool_missing_marker: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessConfig {
    pub timeout: Option<String>,
    pub poll_interval: Option<String>,
}

impl GateConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(mut self, other: FleetConfig) -> Self {
        let fleet = self.fleet.get_or_insert_with(FleetConfig::default);
        if other.namespace.is_some() {
            fleet.namespace = other.namespace;
        }
        if other.statefulset.is_some() {
            fleet.statefulset = other.statefulset;
        }
        if other.http_port.is_some() {
            fleet.http_port = other.http_port;
        }
        if other.container.is_some() {
            fleet.container = other.container;
        }
        if other.service.is_some() {
            fleet.service = other.service;
        }
        self
    }

    /// Resolve the `[fleet]` table. Namespace, statefulset and port are required.
    pub fn fleet_spec(&self) -> anyhow::Result<FleetSpec> {
        let fleet = self.fleet.clone().unwrap_or_default();
        let Some(namespace) = fleet.namespace else {
            bail!("fleet.namespace is not set");
        };
        let Some(statefulset) = fleet.statefulset else {
            bail!("fleet.statefulset is not set");
        };
        let Some(http_port) = fleet.http_port else {
            bail!("fleet.http_port is not set");
        };

        Ok(FleetSpec {
            service: fleet.service.unwrap_or_else(|| statefulset.clone()),
            container: fleet.container.unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
            namespace,
            statefulset,
            http_port,
        })
    }

    /// Resolve the `[policy]` table, filling gaps with defaults.
    pub fn probe_policy(&self) -> anyhow::Result<ProbePolicy> {
        let defaults = ProbePolicy::default();
        let Some(cfg) = &self.policy else {
            return Ok(defaults);
        };

        let multiplier = cfg.multiplier.unwrap_or(defaults.backoff.multiplier);
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            bail!("policy.multiplier must be at least 1.0, got {multiplier}");
        }

        let backoff = BackoffPolicy {
            initial_interval: duration_or(
                "policy.initial_interval",
                cfg.initial_interval.as_deref(),
                defaults.backoff.initial_interval,
            )?,
            multiplier,
            max_interval: duration_or(
                "policy.max_interval",
                cfg.max_interval.as_deref(),
                defaults.backoff.max_interval,
            )?,
            max_elapsed: duration_or(
                "policy.max_elapsed",
                cfg.max_elapsed.as_deref(),
                defaults.backoff.max_elapsed,
            )?,
        };
        if backoff.initial_interval.is_zero() {
            bail!("policy.initial_interval must be greater than zero");
        }
        if backoff.max_interval.is_zero() {
            bail!("policy.max_interval must be greater than zero");
        }
        if backoff.initial_interval > backoff.max_interval {
            bail!(
                "policy.initial_interval ({:?}) exceeds policy.max_interval ({:?})",
                backoff.initial_interval,
                backoff.max_interval
            );
        }

        Ok(ProbePolicy {
            backoff,
            settle_delay: duration_or(
                "policy.settle_delay",
                cfg.settle_delay.as_deref(),
                defaults.settle_delay,
            )?,
            fallback_delay: duration_or(
                "policy.fallback_delay",
                cfg.fallback_delay.as_deref(),
                defaults.fallback_delay,
            )?,
            tool_missing_marker: cfg
                .tool_missing_marker
                .clone()
                .unwrap_or(defaults.tool_missing_marker),
        })
    }

    /// Resolve the `[readiness]` table, filling gaps with defaults.
    pub fn readiness_policy(&self) -> anyhow::Result<ReadinessPolicy> {
        let defaults = ReadinessPolicy::default();
        let Some(cfg) = &self.readiness else {
            return Ok(defaults);
        };
        Ok(ReadinessPolicy {
            timeout: duration_or("readiness.timeout", cfg.timeout.as_deref(), defaults.timeout)?,
            poll_interval: duration_or(
                "readiness.poll_interval",
                cfg.poll_interval.as_deref(),
                defaults.poll_interval,
            )?,
        })
    }
}

fn duration_or(
    key: &str,
    value: Option<&str>,
    default: std::time::Duration,
) -> anyhow::Result<std::time::Duration> {
    match value {
        None => Ok(default),
        Some(raw) => parse_duration(raw)
            .with_context(|| format!("{key}: invalid duration {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = GateConfig::from_toml_str("").unwrap();
        assert_eq!(config.probe_policy().unwrap(), ProbePolicy::default());
        assert_eq!(config.readiness_policy().unwrap(), ReadinessPolicy::default());
        assert!(config.fleet_spec().is_err());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[fleet]
namespace = "crdb"
statefulset = "cockroachdb"
http_port = 8080
container = "cockroach"

[policy]
initial_interval = "1s"
multiplier = 2.0
max_interval = "5s"
max_elapsed = "1m"
settle_delay = "10s"
fallback_delay = "30s"
tool_missing_marker = "wget: not found"

[readiness]
timeout = "2m"
poll_interval = "500ms"
"#;
        let config = GateConfig::from_toml_str(toml_str).unwrap();

        let fleet = config.fleet_spec().unwrap();
        assert_eq!(fleet.namespace, "crdb");
        assert_eq!(fleet.service, "cockroachdb");
        assert_eq!(fleet.container, "cockroach");
        assert_eq!(fleet.http_port, 8080);

        let policy = config.probe_policy().unwrap();
        assert_eq!(policy.backoff.initial_interval, Duration::from_secs(1));
        assert_eq!(policy.backoff.multiplier, 2.0);
        assert_eq!(policy.backoff.max_interval, Duration::from_secs(5));
        assert_eq!(policy.backoff.max_elapsed, Duration::from_secs(60));
        assert_eq!(policy.settle_delay, Duration::from_secs(10));
        assert_eq!(policy.fallback_delay, Duration::from_secs(30));
        assert_eq!(policy.tool_missing_marker, "wget: not found");

        let readiness = config.readiness_policy().unwrap();
        assert_eq!(readiness.timeout, Duration::from_secs(120));
        assert_eq!(readiness.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn partial_policy_keeps_other_defaults() {
        let config = GateConfig::from_toml_str("[policy]\nsettle_delay = \"5s\"\n").unwrap();
        let policy = config.probe_policy().unwrap();
        assert_eq!(policy.settle_delay, Duration::from_secs(5));
        assert_eq!(policy.backoff, BackoffPolicy::default());
        assert_eq!(policy.fallback_delay, Duration::from_secs(60));
    }

    #[test]
    fn invalid_duration_names_the_key() {
        let config = GateConfig::from_toml_str("[policy]\nmax_elapsed = \"forever\"\n").unwrap();
        let err = config.probe_policy().unwrap_err();
        assert!(err.to_string().contains("policy.max_elapsed"));
    }

    #[test]
    fn shrinking_multiplier_is_rejected() {
        let config = GateConfig::from_toml_str("[policy]\nmultiplier = 0.5\n").unwrap();
        assert!(config.probe_policy().is_err());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        for table in [
            "[policy]\ninitial_interval = \"0ms\"\nmax_elapsed = \"1s\"\n",
            "[policy]\nmax_interval = \"0s\"\n",
        ] {
            let config = GateConfig::from_toml_str(table).unwrap();
            let err = config.probe_policy().unwrap_err();
            assert!(err.to_string().contains("greater than zero"), "{err}");
        }
    }

    #[test]
    fn initial_interval_above_max_is_rejected() {
        let config = GateConfig::from_toml_str(
            "[policy]\ninitial_interval = \"30s\"\nmax_interval = \"10s\"\n",
        )
        .unwrap();
        let err = config.probe_policy().unwrap_err();
        assert!(err.to_string().contains("exceeds policy.max_interval"));
    }

    #[test]
    fn huge_multiplier_is_accepted_and_capped() {
        let config = GateConfig::from_toml_str("[policy]\nmultiplier = 1e300\n").unwrap();
        let backoff = config.probe_policy().unwrap().backoff;
        let next = backoff.next_interval(backoff.initial_interval);
        assert_eq!(next, backoff.max_interval);
        assert_eq!(backoff.next_interval(next), backoff.max_interval);
    }

    #[test]
    fn overflowing_minutes_name_the_key() {
        let config =
            GateConfig::from_toml_str(&format!("[policy]\nmax_elapsed = \"{}m\"\n", u64::MAX))
                .unwrap();
        let err = config.probe_policy().unwrap_err();
        assert!(err.to_string().contains("policy.max_elapsed"));
    }

    #[test]
    fn merge_overrides_file_values() {
        let config = GateConfig::from_toml_str(
            "[fleet]\nnamespace = \"a\"\nstatefulset = \"db\"\nhttp_port = 8080\n",
        )
        .unwrap()
        .merge(FleetConfig {
            namespace: Some("b".to_string()),
            ..Default::default()
        });

        let fleet = config.fleet_spec().unwrap();
        assert_eq!(fleet.namespace, "b");
        assert_eq!(fleet.statefulset, "db");
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollgate.toml");
        std::fs::write(
            &path,
            "[fleet]\nnamespace = \"crdb\"\nstatefulset = \"cockroachdb\"\nhttp_port = 8080\n",
        )
        .unwrap();

        let config = GateConfig::from_file(&path).unwrap();
        assert_eq!(config.fleet_spec().unwrap().pod_name(2), "cockroachdb-2");
    }

    #[test]
    fn from_file_missing_reports_path() {
        let err = GateConfig::from_file(Path::new("/nonexistent/rollgate.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/rollgate.toml"));
    }
}
