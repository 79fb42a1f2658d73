//! Recording implementation of the gateway for testing purposes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use crdb_gateway::{Activation, Error, Gateway, Result, content_hash};
use parking_lot::Mutex;
use uuid::Uuid;

/// A call made against [`MockGateway`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GatewayCall {
    /// `install_binary`.
    InstallBinary {
        /// Requested version.
        version: String,
        /// Local tarball, if any.
        source: Option<PathBuf>,
    },

    /// `activate_service_descriptor`.
    ActivateServiceDescriptor {
        /// Rendered descriptor.
        content: String,
        /// Whether the caller considered the service running.
        running: bool,
        /// Emulated outcome.
        activation: Activation,
    },

    /// `start_service`.
    StartService,

    /// `restart_service`.
    RestartService,

    /// `initialize_cluster`.
    InitializeCluster,

    /// `fetch_cluster_id`.
    FetchClusterId,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<GatewayCall>,
    cluster_id: Uuid,
    descriptor_hash: Option<String>,
    fail_init: bool,
}

/// Mock gateway. Clones share the same recorded state, so one instance can
/// stand in for the processes of a whole cluster.
#[derive(Clone, Debug)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

impl MockGateway {
    /// Creates a mock whose cluster id lookups return `cluster_id`.
    #[must_use]
    pub fn new(cluster_id: Uuid) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                cluster_id,
                descriptor_hash: None,
                fail_init: false,
            })),
        }
    }

    /// Makes every subsequent `initialize_cluster` call fail.
    pub fn fail_init(&self) {
        self.state.lock().fail_init = true;
    }

    /// The cluster id returned by lookups.
    #[must_use]
    pub fn cluster_id(&self) -> Uuid {
        self.state.lock().cluster_id
    }

    /// All recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls equal to `call`.
    #[must_use]
    pub fn count(&self, call: &GatewayCall) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    /// Number of activations that wrote a descriptor.
    #[must_use]
    pub fn descriptor_writes(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    GatewayCall::ActivateServiceDescriptor { activation, .. }
                        if *activation != Activation::Unchanged
                )
            })
            .count()
    }

    /// Content of the most recent descriptor written.
    #[must_use]
    pub fn last_descriptor(&self) -> Option<String> {
        self.state.lock().calls.iter().rev().find_map(|c| match c {
            GatewayCall::ActivateServiceDescriptor {
                content,
                activation,
                ..
            } if *activation != Activation::Unchanged => Some(content.clone()),
            _ => None,
        })
    }

    fn record(&self, call: GatewayCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn binary_path(&self) -> PathBuf {
        PathBuf::from("/usr/local/bin/cockroach")
    }

    async fn install_binary(&self, version: &str, source: Option<&Path>) -> Result<PathBuf> {
        self.record(GatewayCall::InstallBinary {
            version: version.to_string(),
            source: source.map(Path::to_path_buf),
        });

        Ok(self.binary_path())
    }

    async fn activate_service_descriptor(
        &self,
        content: &str,
        running: bool,
    ) -> Result<Activation> {
        let hash = content_hash(content);
        let mut state = self.state.lock();

        let activation = if state.descriptor_hash.as_deref() == Some(hash.as_str()) {
            Activation::Unchanged
        } else if running {
            Activation::Restarted
        } else {
            Activation::Reloaded
        };

        state.descriptor_hash = Some(hash);
        state.calls.push(GatewayCall::ActivateServiceDescriptor {
            content: content.to_string(),
            running,
            activation,
        });
        drop(state);

        Ok(activation)
    }

    async fn start_service(&self) -> Result<()> {
        self.record(GatewayCall::StartService);
        Ok(())
    }

    async fn restart_service(&self) -> Result<()> {
        self.record(GatewayCall::RestartService);
        Ok(())
    }

    async fn initialize_cluster(&self) -> Result<()> {
        self.record(GatewayCall::InitializeCluster);

        if self.state.lock().fail_init {
            return Err(Error::Init {
                code: Some(1),
                stderr: "ERROR: cluster has already been initialized".to_string(),
            });
        }

        Ok(())
    }

    async fn fetch_cluster_id(&self) -> Result<Uuid> {
        self.record(GatewayCall::FetchClusterId);
        Ok(self.cluster_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_activation_emulates_hash_comparison() {
        let gateway = MockGateway::default();

        assert_eq!(
            gateway.activate_service_descriptor("a", false).await.unwrap(),
            Activation::Reloaded
        );
        assert_eq!(
            gateway.activate_service_descriptor("a", true).await.unwrap(),
            Activation::Unchanged
        );
        assert_eq!(
            gateway.activate_service_descriptor("b", true).await.unwrap(),
            Activation::Restarted
        );

        assert_eq!(gateway.descriptor_writes(), 2);
        assert_eq!(gateway.last_descriptor().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_fail_init() {
        let gateway = MockGateway::default();
        gateway.fail_init();

        assert!(matches!(
            gateway.initialize_cluster().await,
            Err(Error::Init { .. })
        ));
        assert_eq!(gateway.count(&GatewayCall::InitializeCluster), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let cluster_id = Uuid::new_v4();
        let gateway = MockGateway::new(cluster_id);
        let other = gateway.clone();

        assert_eq!(other.fetch_cluster_id().await.unwrap(), cluster_id);
        assert_eq!(gateway.calls(), vec![GatewayCall::FetchClusterId]);
    }
}
