//! fleetwatchd: the fleetwatch daemon.
//!
//! Single binary that assembles the controller:
//! - Cloud backend (compute + metrics)
//! - Lifecycle manager
//! - Health gate
//! - Upstream sync
//! - Reconciliation loop
//!
//! # Usage
//!
//! ```text
//! fleetwatchd --config /etc/fleetwatch/fleetwatch.toml run
//! fleetwatchd --config fleetwatch.toml plan
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use fleetwatch_core::NodeId;

mod daemon;

const DEFAULT_FILTER: &str = "info,fleetwatchd=debug,fleetwatch=debug";

#[derive(Parser)]
#[command(
    name = "fleetwatchd",
    about = "Alarm-driven autoscaling controller for a tagged node fleet",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to fleetwatch.toml.
    #[arg(short, long, global = true, default_value = "fleetwatch.toml")]
    config: PathBuf,

    /// Override the reconciliation interval (e.g. "30s", "2m").
    #[arg(long, global = true)]
    check_period: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile on every check period until SIGINT, SIGTERM or SIGHUP.
    Run,
    /// Run a single reconciliation pass and print its report.
    Once,
    /// Print the fleet snapshot and the action a pass would take.
    Plan,
    /// Terminate a node and delete its alarm.
    Purge {
        /// Node to purge.
        node_id: String,
    },
    /// Validate the config file and the proxy upstream, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = daemon::load_config(&cli.config, cli.check_period)?;

    match cli.command {
        Command::Run => daemon::run(daemon::build(&config)?).await,
        Command::Once => daemon::once(daemon::build(&config)?).await,
        Command::Plan => daemon::plan(&daemon::build(&config)?).await,
        Command::Purge { node_id } => {
            let id = NodeId::new(node_id)?;
            daemon::purge(&daemon::build(&config)?, &id).await
        }
        Command::CheckConfig => daemon::check_config(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
