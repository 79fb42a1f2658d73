use crate::config::Config;
use crate::error::Result;
use crate::notification::Notification;
use crate::state::UnitState;
use crate::status::{
    EXTRA_UNIT_MESSAGE, INITIALIZING_MESSAGE, UnitStatus, WAITING_FOR_LEADER_MESSAGE,
};

use crdb_descriptor::{RenderOptions, ServiceLayout, render};
use crdb_directory::{ClusterIdentity, PeerDirectory, Relation};
use crdb_gateway::Gateway;
use tracing::{debug, info, warn};

/// What to do on `Start`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartDecision {
    /// Start the database service.
    StartService,

    /// Refuse to start: another unit owns the single-node cluster.
    Block,
}

/// What to do on `Started`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartedDecision {
    /// Not joined yet; try again later.
    Defer,

    /// The cluster is already initialized.
    Active,

    /// Not the leader; wait for the leader and try again later.
    Wait,

    /// Initialize the cluster and record its identity.
    Initialize {
        /// Whether `cockroach init` has to run. `start-single-node`
        /// initializes on its own.
        run_init: bool,
    },
}

/// Decides how to handle `Start`.
#[must_use]
pub fn decide_start(single_node: bool, initial_unit: Option<&str>, unit: &str) -> StartDecision {
    match initial_unit {
        Some(initial_unit) if single_node && initial_unit != unit => StartDecision::Block,
        _ => StartDecision::StartService,
    }
}

/// Decides how to handle `Started`. Leadership is read once by the caller
/// and passed in.
#[must_use]
pub const fn decide_started(
    joined: bool,
    initialized: bool,
    is_leader: bool,
    single_node: bool,
) -> StartedDecision {
    if !joined {
        StartedDecision::Defer
    } else if initialized {
        StartedDecision::Active
    } else if !is_leader {
        StartedDecision::Wait
    } else {
        StartedDecision::Initialize {
            run_init: !single_node,
        }
    }
}

/// Result of handling one notification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Handled to completion.
    Done,

    /// Must be redelivered later.
    Defer,

    /// Handled, and raised a follow-up notification.
    Emit(Notification),
}

/// Options for [`Coordinator`].
#[derive(Debug)]
pub struct CoordinatorOptions<R, G>
where
    R: Relation,
    G: Gateway,
{
    /// Operator configuration.
    pub config: Config,

    /// Peer directory of the local unit.
    pub directory: PeerDirectory<R>,

    /// Gateway to the database binary and service manager.
    pub gateway: G,

    /// Paths and user of the rendered service.
    pub layout: ServiceLayout,
}

/// Per-unit bootstrap state machine.
#[derive(Debug)]
pub struct Coordinator<R, G>
where
    R: Relation,
    G: Gateway,
{
    config: Config,
    directory: PeerDirectory<R>,
    gateway: G,
    layout: ServiceLayout,
    state: UnitState,
}

impl<R, G> Coordinator<R, G>
where
    R: Relation,
    G: Gateway,
{
    /// Creates a new `Coordinator` resuming from `state`.
    pub fn new(
        CoordinatorOptions {
            config,
            directory,
            gateway,
            layout,
        }: CoordinatorOptions<R, G>,
        state: UnitState,
    ) -> Self {
        Self {
            config,
            directory,
            gateway,
            layout,
            state,
        }
    }

    /// Current configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the configuration. Takes effect at the next decision point.
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// The peer directory.
    pub const fn directory(&self) -> &PeerDirectory<R> {
        &self.directory
    }

    /// The gateway.
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Persistable state.
    pub const fn state(&self) -> &UnitState {
        &self.state
    }

    /// Current status.
    pub const fn status(&self) -> &UnitStatus {
        &self.state.status
    }

    fn set_status(&mut self, status: UnitStatus) {
        if self.state.status != status {
            info!("{}: status {}", self.directory.unit_name(), status);
            self.state.status = status;
        }
    }

    /// Handles one notification to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory read, a gateway call or the
    /// identity publication fails.
    pub async fn handle(&mut self, notification: Notification) -> Result<Outcome> {
        debug!("{}: handling {}", self.directory.unit_name(), notification);

        match notification {
            Notification::Install => self.on_install().await,
            Notification::Start => self.on_start().await,
            Notification::ConfigChanged => Ok(self.on_config_changed()),
            Notification::PeerRelationChanged => self.on_peer_relation_changed().await,
            Notification::Started => self.on_started().await,
        }
    }

    /// Renders the service descriptor from the current configuration and
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn render_descriptor(&self) -> Result<String> {
        let advertise_address = self.directory.advertise_address().await?;
        let joined = self.directory.is_joined().await?;
        let peer_addresses = self.directory.peer_addresses().await?;

        Ok(render(&RenderOptions {
            advertise_address: &advertise_address,
            binary_path: &self.layout.binary_path,
            joined,
            peer_addresses: &peer_addresses,
            single_node: self.config.is_single_node(),
            user: &self.layout.user,
            working_directory: &self.layout.working_directory,
        }))
    }

    async fn setup_service(&self) -> Result<()> {
        let descriptor = self.render_descriptor().await?;
        let activation = self
            .gateway
            .activate_service_descriptor(&descriptor, self.state.started)
            .await?;

        debug!("descriptor activation: {:?}", activation);

        Ok(())
    }

    async fn on_install(&mut self) -> Result<Outcome> {
        self.gateway
            .install_binary(&self.config.version, self.config.resource.as_deref())
            .await?;

        self.state.started = false;
        self.setup_service().await?;
        self.state.installed = true;

        Ok(Outcome::Done)
    }

    async fn on_start(&mut self) -> Result<Outcome> {
        let unit = self.directory.unit_name().to_string();
        let initial_unit = self.directory.initial_unit().await?;

        if decide_start(self.config.is_single_node(), initial_unit.as_deref(), &unit)
            == StartDecision::Block
        {
            warn!(
                "{}: cluster already initialized by {:?}, not starting",
                unit, initial_unit
            );
            self.set_status(UnitStatus::Blocked(EXTRA_UNIT_MESSAGE.to_string()));

            return Ok(Outcome::Done);
        }

        self.gateway.start_service().await?;
        self.state.started = true;

        if self.directory.is_joined().await? && self.directory.is_cluster_initialized().await? {
            self.set_status(UnitStatus::Active);
        }

        Ok(Outcome::Emit(Notification::Started))
    }

    fn on_config_changed(&self) -> Outcome {
        // Replication factors are only read at decision points.
        info!(
            "{}: configuration changed, nothing to apply",
            self.directory.unit_name()
        );

        Outcome::Done
    }

    async fn on_peer_relation_changed(&mut self) -> Result<Outcome> {
        self.setup_service().await?;

        if self.state.started && self.directory.is_cluster_initialized().await? {
            self.set_status(UnitStatus::Active);
        }

        Ok(Outcome::Done)
    }

    async fn on_started(&mut self) -> Result<Outcome> {
        let joined = self.directory.is_joined().await?;
        let initialized = self.directory.is_cluster_initialized().await?;
        let is_leader = self.directory.is_leader().await?;

        match decide_started(joined, initialized, is_leader, self.config.is_single_node()) {
            StartedDecision::Defer => {
                debug!("{}: not joined yet", self.directory.unit_name());
                Ok(Outcome::Defer)
            }
            StartedDecision::Active => {
                self.set_status(UnitStatus::Active);
                Ok(Outcome::Done)
            }
            StartedDecision::Wait => {
                self.set_status(UnitStatus::Waiting(
                    WAITING_FOR_LEADER_MESSAGE.to_string(),
                ));
                Ok(Outcome::Defer)
            }
            StartedDecision::Initialize { run_init } => {
                self.set_status(UnitStatus::Maintenance(INITIALIZING_MESSAGE.to_string()));

                if run_init {
                    self.gateway.initialize_cluster().await?;
                }

                let identity = ClusterIdentity {
                    initial_unit: self.directory.unit_name().to_string(),
                    cluster_id: self.gateway.fetch_cluster_id().await?,
                };

                if !self.directory.publish_cluster_identity(&identity).await? {
                    warn!(
                        "{}: a cluster identity was already recorded, keeping it",
                        identity.initial_unit
                    );
                }

                self.set_status(UnitStatus::Active);
                Ok(Outcome::Done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_start() {
        assert_eq!(decide_start(false, None, "db/0"), StartDecision::StartService);
        assert_eq!(
            decide_start(false, Some("db/1"), "db/0"),
            StartDecision::StartService
        );
        assert_eq!(decide_start(true, None, "db/0"), StartDecision::StartService);
        assert_eq!(
            decide_start(true, Some("db/0"), "db/0"),
            StartDecision::StartService
        );
        assert_eq!(decide_start(true, Some("db/1"), "db/0"), StartDecision::Block);
    }

    #[test]
    fn test_decide_started() {
        assert_eq!(
            decide_started(false, false, true, false),
            StartedDecision::Defer
        );
        assert_eq!(
            decide_started(true, true, false, false),
            StartedDecision::Active
        );
        assert_eq!(
            decide_started(true, true, true, false),
            StartedDecision::Active
        );
        assert_eq!(
            decide_started(true, false, false, false),
            StartedDecision::Wait
        );
        assert_eq!(
            decide_started(true, false, true, false),
            StartedDecision::Initialize { run_init: true }
        );
        assert_eq!(
            decide_started(true, false, true, true),
            StartedDecision::Initialize { run_init: false }
        );
    }
}
