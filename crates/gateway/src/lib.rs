//! Gateway to the processes a database unit depends on: the `cockroach`
//! binary and the service manager.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cli;
mod error;
mod install;
mod runner;
mod service;

pub use cli::{CockroachCli, RetryPolicy, parse_cluster_id};
pub use error::{Error, Result};
pub use install::{DEFAULT_DOWNLOAD_BASE_URL, DEFAULT_INSTALL_DIR, Installer};
pub use runner::{CommandOutput, CommandRunner, TokioCommandRunner};
pub use service::{
    Activation, DEFAULT_SERVICE_NAME, DEFAULT_UNIT_FILE, ServiceManager, ServiceUnit, Systemd,
    content_hash,
};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

/// Operations the bootstrap coordinator performs on the outside world.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Path the database binary is (or will be) installed to.
    fn binary_path(&self) -> PathBuf;

    /// Installs the binary for `version`, preferring the tarball at `source`
    /// when it exists.
    async fn install_binary(&self, version: &str, source: Option<&Path>) -> Result<PathBuf>;

    /// Writes the service descriptor if it changed since the last
    /// activation.
    async fn activate_service_descriptor(&self, content: &str, running: bool)
    -> Result<Activation>;

    /// Starts the database service.
    async fn start_service(&self) -> Result<()>;

    /// Restarts the database service.
    async fn restart_service(&self) -> Result<()>;

    /// Runs one-time cluster initialization.
    async fn initialize_cluster(&self) -> Result<()>;

    /// Reads the id of the cluster the local node belongs to.
    async fn fetch_cluster_id(&self) -> Result<Uuid>;
}

/// Options for [`CockroachGateway`].
#[derive(Clone, Debug)]
pub struct CockroachGatewayOptions {
    /// Origin of release tarballs.
    pub download_base_url: String,

    /// File holding the hash of the last activated descriptor.
    pub hash_file: PathBuf,

    /// Directory the binary is installed into.
    pub install_dir: PathBuf,

    /// Retry policy for cluster id lookups.
    pub retry: RetryPolicy,

    /// Service unit name.
    pub service_name: String,

    /// Unit file path.
    pub unit_file: PathBuf,
}

impl CockroachGatewayOptions {
    /// Default options with the descriptor hash kept under `state_dir`.
    #[must_use]
    pub fn with_state_dir(state_dir: &Path) -> Self {
        Self {
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            hash_file: state_dir.join(format!("{DEFAULT_SERVICE_NAME}.sha256")),
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            retry: RetryPolicy::default(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            unit_file: PathBuf::from(DEFAULT_UNIT_FILE),
        }
    }
}

/// [`Gateway`] driving a real `cockroach` binary and service manager.
#[derive(Clone, Debug)]
pub struct CockroachGateway<R = TokioCommandRunner, M = Systemd>
where
    R: CommandRunner,
    M: ServiceManager,
{
    cli: CockroachCli<R>,
    installer: Installer,
    service: ServiceUnit<M>,
}

impl<R, M> CockroachGateway<R, M>
where
    R: CommandRunner,
    M: ServiceManager,
{
    /// Creates a new `CockroachGateway`.
    pub fn new(options: CockroachGatewayOptions, runner: R, manager: M) -> Self {
        let installer = Installer::new(options.install_dir, options.download_base_url);

        Self {
            cli: CockroachCli::new(installer.binary_path(), runner, options.retry),
            installer,
            service: ServiceUnit::new(
                options.service_name,
                options.unit_file,
                options.hash_file,
                manager,
            ),
        }
    }
}

#[async_trait]
impl<R, M> Gateway for CockroachGateway<R, M>
where
    R: CommandRunner,
    M: ServiceManager,
{
    fn binary_path(&self) -> PathBuf {
        self.installer.binary_path()
    }

    async fn install_binary(&self, version: &str, source: Option<&Path>) -> Result<PathBuf> {
        self.installer.install(version, source).await
    }

    async fn activate_service_descriptor(
        &self,
        content: &str,
        running: bool,
    ) -> Result<Activation> {
        self.service.activate(content, running).await
    }

    async fn start_service(&self) -> Result<()> {
        self.service.start().await
    }

    async fn restart_service(&self) -> Result<()> {
        self.service.restart().await
    }

    async fn initialize_cluster(&self) -> Result<()> {
        self.cli.init().await
    }

    async fn fetch_cluster_id(&self) -> Result<Uuid> {
        self.cli.fetch_cluster_id().await
    }
}
