use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use rollgate_health::{HealthChecker, KubectlReadiness, ProbeOutcome, Shutdown};

use super::load_settings;
use crate::FleetArgs;

pub async fn probe(
    config: Option<&Path>,
    args: &FleetArgs,
    replica: u32,
    label: Option<&str>,
) -> anyhow::Result<()> {
    let settings = load_settings(config, args)?;
    let label = label.unwrap_or(&settings.fleet.statefulset).to_string();

    let readiness = KubectlReadiness::new((*settings.kubectl).clone(), settings.readiness);
    let checker = HealthChecker::new(
        settings.fleet.clone(),
        settings.kubectl.clone(),
        Arc::new(readiness),
        settings.kubectl.clone(),
    )
    .with_policy(settings.policy);

    // Ctrl-C cancels whatever wait the probe is in.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    match checker.probe(&label, replica, Shutdown::new(shutdown_rx)).await {
        Ok(ProbeOutcome::Converged) => {
            println!("✓ {label}: ranges fully replicated, safe to restart the next pod");
            Ok(())
        }
        Ok(ProbeOutcome::ToolUnavailable) => {
            println!("✓ {label}: scrape tool unavailable, waited the fallback delay");
            Ok(())
        }
        Err(e) => {
            eprintln!("Probe failed: {e}");
            Err(e.into())
        }
    }
}
