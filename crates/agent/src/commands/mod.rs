mod hook;
mod run;
mod status;

pub use hook::hook;
pub use run::run;
pub use status::status;

use crate::Cli;
use crate::error::Result;

use crdb_bootstrap::{Config, CoordinatorOptions, Dispatcher, FileStateStore};
use crdb_descriptor::ServiceLayout;
use crdb_directory::PeerDirectory;
use crdb_directory_fs::FsRelation;
use crdb_gateway::{CockroachGateway, CockroachGatewayOptions, Gateway, Systemd, TokioCommandRunner};
use tracing::info;

type AgentDispatcher = Dispatcher<FsRelation, CockroachGateway, FileStateStore>;

const STATE_FILE: &str = "state.json";

/// Reads the configuration file, or the defaults when none was given.
fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::default()),
    }
}

fn state_store(cli: &Cli) -> FileStateStore {
    FileStateStore::new(cli.state_dir.join(STATE_FILE))
}

fn relation(cli: &Cli) -> FsRelation {
    FsRelation::new(&cli.peers_dir, &cli.unit, cli.address.clone())
}

async fn dispatcher(cli: &Cli, config: Config) -> Result<AgentDispatcher> {
    let gateway = CockroachGateway::new(
        CockroachGatewayOptions {
            install_dir: cli.install_dir.clone(),
            unit_file: cli.unit_file.clone(),
            ..CockroachGatewayOptions::with_state_dir(&cli.state_dir)
        },
        TokioCommandRunner,
        Systemd,
    );

    let layout = ServiceLayout {
        binary_path: gateway.binary_path(),
        ..ServiceLayout::default()
    };

    info!(
        "unit {} using peers at {}",
        cli.unit,
        cli.peers_dir.display()
    );

    Ok(Dispatcher::load(
        CoordinatorOptions {
            config,
            directory: PeerDirectory::new(relation(cli)),
            gateway,
            layout,
        },
        state_store(cli),
    )
    .await?)
}
