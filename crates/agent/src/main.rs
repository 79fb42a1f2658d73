//! Binary that bootstraps a CockroachDB unit and keeps it converged with its
//! peers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod commands;
mod error;

use error::Result;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crdb_bootstrap::Notification;
use crdb_gateway::{DEFAULT_INSTALL_DIR, DEFAULT_UNIT_FILE};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Name of this unit, e.g. `cockroachdb/0`
    #[arg(long, env = "CRDB_UNIT")]
    unit: String,

    /// Address advertised to peers (defaults to loopback)
    #[arg(long, env = "CRDB_ADDRESS")]
    address: Option<String>,

    /// JSON configuration file
    #[arg(long, env = "CRDB_CONFIG")]
    config: Option<PathBuf>,

    /// Directory shared by every unit of the deployment
    #[arg(long, env = "CRDB_PEERS_DIR", default_value = "/var/lib/crdb-agent/peers")]
    peers_dir: PathBuf,

    /// Directory for local state
    #[arg(long, default_value = "/var/lib/crdb-agent")]
    state_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_INSTALL_DIR)]
    install_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_UNIT_FILE)]
    unit_file: PathBuf,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the database binary and service unit
    Install,
    /// Start the database service
    Start,
    /// Apply a configuration change
    ConfigChanged,
    /// React to peers joining or publishing data
    PeerRelationChanged,
    /// Join the peers and keep the unit converged until stopped
    Run {
        /// Poll interval in seconds
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
    /// Print the persisted status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(cli.log_level)
            .finish(),
    )?;

    match &cli.command {
        Commands::Install => commands::hook(&cli, Notification::Install).await,
        Commands::Start => commands::hook(&cli, Notification::Start).await,
        Commands::ConfigChanged => commands::hook(&cli, Notification::ConfigChanged).await,
        Commands::PeerRelationChanged => {
            commands::hook(&cli, Notification::PeerRelationChanged).await
        }
        Commands::Run { interval } => commands::run(&cli, *interval).await,
        Commands::Status => commands::status(&cli).await,
    }
}
