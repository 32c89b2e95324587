use std::path::Path;

use anyhow::bail;
use serde_json::json;

use rollgate_health::{CheckFailure, PodChecker, ReplicaSource};

use super::load_settings;
use crate::FleetArgs;

pub async fn sweep(config: Option<&Path>, args: &FleetArgs, format: &str) -> anyhow::Result<()> {
    let settings = load_settings(config, args)?;
    let fleet = settings.fleet.clone();

    let replicas = settings
        .kubectl
        .replica_count(&fleet.namespace, &fleet.statefulset)
        .await
        .map_err(anyhow::Error::msg)?;

    let checker = PodChecker::new(
        settings.kubectl.clone(),
        fleet.clone(),
        &settings.policy.tool_missing_marker,
    );
    let result = checker.sweep_fleet(replicas).await;

    match format {
        "json" => {
            let value = report(&fleet.qualified_name(), replicas, &result);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => match &result {
            Ok(()) => println!("✓ {}: {replicas} pods converged", fleet.qualified_name()),
            Err(failure) => println!("✗ {}: {failure}", fleet.qualified_name()),
        },
    }

    if let Err(failure) = result {
        bail!("fleet not converged ({})", failure.kind());
    }
    Ok(())
}

fn report(fleet: &str, replicas: u32, result: &Result<(), CheckFailure>) -> serde_json::Value {
    match result {
        Ok(()) => json!({
            "fleet": fleet,
            "replicas": replicas,
            "converged": true,
        }),
        Err(failure) => json!({
            "fleet": fleet,
            "replicas": replicas,
            "converged": false,
            "failure": {
                "kind": failure.kind(),
                "pod": failure.pod(),
                "message": failure.to_string(),
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converged_report() {
        let value = report("crdb/cockroachdb", 3, &Ok(()));
        assert_eq!(value["converged"], true);
        assert_eq!(value["replicas"], 3);
        assert!(value.get("failure").is_none());
    }

    #[test]
    fn failure_report_names_pod() {
        let failure = CheckFailure::TransportFailure {
            pod: "cockroachdb-1".to_string(),
            reason: "connection refused".to_string(),
        };
        let value = report("crdb/cockroachdb", 3, &Err(failure));
        assert_eq!(value["converged"], false);
        assert_eq!(value["failure"]["kind"], "transport_failure");
        assert_eq!(value["failure"]["pod"], "cockroachdb-1");
    }
}
