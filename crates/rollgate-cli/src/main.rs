//! rollgate: health gate for rolling restarts of a replicated database.
//!
//! # Usage
//!
//! ```text
//! rollgate probe --namespace crdb --statefulset cockroachdb --http-port 8080 --replica 2
//! rollgate sweep --config rollgate.toml --format json
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "rollgate",
    about = "Gate rolling restarts on under-replicated ranges reaching zero",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to a rollgate.toml config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that identify the fleet. Each overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct FleetArgs {
    /// Namespace of the StatefulSet.
    #[arg(short, long)]
    pub namespace: Option<String>,
    /// StatefulSet name; pods are named <statefulset>-<ordinal>.
    #[arg(short, long)]
    pub statefulset: Option<String>,
    /// HTTP port serving /_status/vars.
    #[arg(long)]
    pub http_port: Option<u16>,
    /// Container to exec into.
    #[arg(long)]
    pub container: Option<String>,
    /// Headless service name (defaults to the StatefulSet name).
    #[arg(long)]
    pub service: Option<String>,
    /// kubectl binary to invoke.
    #[arg(long, default_value = "kubectl")]
    pub kubectl: String,
    /// kubeconfig context to use.
    #[arg(long)]
    pub context: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full health gate after restarting one pod.
    ///
    /// Exits 0 when it is safe to restart the next pod.
    Probe {
        #[command(flatten)]
        fleet: FleetArgs,
        /// Ordinal of the pod that was just restarted.
        #[arg(short, long)]
        replica: u32,
        /// Label attached to logs and errors (defaults to the StatefulSet).
        #[arg(short, long)]
        label: Option<String>,
    },
    /// Scrape every pod once and report whether the fleet is converged.
    Sweep {
        #[command(flatten)]
        fleet: FleetArgs,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rollgate=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Probe {
            fleet,
            replica,
            label,
        } => commands::probe::probe(cli.config.as_deref(), &fleet, replica, label.as_deref()).await,
        Commands::Sweep { fleet, format } => {
            commands::sweep::sweep(cli.config.as_deref(), &fleet, &format).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_probe_flags() {
        let cli = Cli::try_parse_from([
            "rollgate",
            "probe",
            "--namespace",
            "crdb",
            "--statefulset",
            "cockroachdb",
            "--http-port",
            "8080",
            "--replica",
            "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Probe { fleet, replica, label } => {
                assert_eq!(fleet.namespace.as_deref(), Some("crdb"));
                assert_eq!(fleet.statefulset.as_deref(), Some("cockroachdb"));
                assert_eq!(fleet.http_port, Some(8080));
                assert_eq!(fleet.kubectl, "kubectl");
                assert_eq!(replica, 2);
                assert!(label.is_none());
            }
            Commands::Sweep { .. } => panic!("expected probe"),
        }
    }

    #[test]
    fn probe_requires_replica() {
        assert!(Cli::try_parse_from(["rollgate", "probe", "--namespace", "crdb"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rollgate",
            "sweep",
            "--config",
            "/etc/rollgate.toml",
            "--json",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/rollgate.toml")));
        assert!(matches!(cli.command, Commands::Sweep { ref format, .. } if format == "json"));
    }
}
