pub mod probe;
pub mod sweep;

use std::path::Path;
use std::sync::Arc;

use rollgate_core::config::FleetConfig;
use rollgate_core::{FleetSpec, GateConfig, ProbePolicy, ReadinessPolicy};
use rollgate_health::Kubectl;

use crate::FleetArgs;

/// Everything a command needs, resolved from the config file and flags.
pub struct Settings {
    pub fleet: FleetSpec,
    pub policy: ProbePolicy,
    pub readiness: ReadinessPolicy,
    pub kubectl: Arc<Kubectl>,
}

pub fn load_settings(config: Option<&Path>, args: &FleetArgs) -> anyhow::Result<Settings> {
    let file = match config {
        Some(path) => GateConfig::from_file(path)?,
        None => GateConfig::default(),
    };
    let merged = file.merge(FleetConfig {
        namespace: args.namespace.clone(),
        statefulset: args.statefulset.clone(),
        http_port: args.http_port,
        container: args.container.clone(),
        service: args.service.clone(),
    });

    Ok(Settings {
        fleet: merged.fleet_spec()?,
        policy: merged.probe_policy()?,
        readiness: merged.readiness_policy()?,
        kubectl: Arc::new(Kubectl::new(&args.kubectl).with_context(args.context.clone())),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn flags_alone_are_enough() {
        let args = FleetArgs {
            namespace: Some("crdb".to_string()),
            statefulset: Some("cockroachdb".to_string()),
            http_port: Some(8080),
            kubectl: "kubectl".to_string(),
            ..Default::default()
        };
        let settings = load_settings(None, &args).unwrap();
        assert_eq!(settings.fleet, FleetSpec::new("crdb", "cockroachdb", 8080));
        assert_eq!(settings.policy, ProbePolicy::default());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollgate.toml");
        std::fs::write(
            &path,
            r#"
[fleet]
namespace = "staging"
statefulset = "cockroachdb"
http_port = 8080

[policy]
settle_delay = "30s"
"#,
        )
        .unwrap();

        let args = FleetArgs {
            namespace: Some("prod".to_string()),
            kubectl: "kubectl".to_string(),
            ..Default::default()
        };
        let settings = load_settings(Some(&path), &args).unwrap();
        assert_eq!(settings.fleet.namespace, "prod");
        assert_eq!(settings.fleet.statefulset, "cockroachdb");
        assert_eq!(settings.policy.settle_delay, Duration::from_secs(30));
    }

    #[test]
    fn missing_statefulset_is_an_error() {
        let args = FleetArgs {
            namespace: Some("crdb".to_string()),
            http_port: Some(8080),
            ..Default::default()
        };
        let err = load_settings(None, &args).err().unwrap();
        assert!(err.to_string().contains("fleet.statefulset"));
    }
}
