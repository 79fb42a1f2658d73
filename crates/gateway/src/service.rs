use crate::error::{Error, Result};

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use systemctl::SystemCtl;
use tokio::process::Command;
use tracing::{debug, info};

/// Name of the managed service unit.
pub const DEFAULT_SERVICE_NAME: &str = "cockroachdb.service";

/// Default location of the unit file.
pub const DEFAULT_UNIT_FILE: &str = "/etc/systemd/system/cockroachdb.service";

/// Outcome of activating a service descriptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Activation {
    /// Content hash matched; nothing was written.
    Unchanged,

    /// New content written and the service manager reloaded.
    Reloaded,

    /// New content written, reloaded, and the running service restarted.
    Restarted,
}

/// Service-manager primitives.
#[async_trait]
pub trait ServiceManager: Send + Sync + 'static {
    /// Reloads unit definitions.
    async fn daemon_reload(&self) -> Result<()>;

    /// Starts `unit`.
    async fn start(&self, unit: &str) -> Result<()>;

    /// Restarts `unit`.
    async fn restart(&self, unit: &str) -> Result<()>;
}

fn check(action: &'static str, unit: &str, status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::ServiceControl {
            action,
            unit: unit.to_string(),
            code: status.code(),
        })
    }
}

/// [`ServiceManager`] backed by systemd.
#[derive(Clone, Copy, Debug, Default)]
pub struct Systemd;

#[async_trait]
impl ServiceManager for Systemd {
    async fn daemon_reload(&self) -> Result<()> {
        let status = Command::new("systemctl")
            .arg("daemon-reload")
            .status()
            .await
            .map_err(|e| Error::Io("failed to run systemctl daemon-reload", e))?;

        check("daemon-reload", "", status)
    }

    async fn start(&self, unit: &str) -> Result<()> {
        let name = unit.to_string();
        let status = tokio::task::spawn_blocking(move || SystemCtl::default().start(&name))
            .await
            .map_err(|e| Error::Io("systemctl task failed", e.into()))?
            .map_err(|e| Error::Io("failed to start service", e))?;

        check("start", unit, status)
    }

    async fn restart(&self, unit: &str) -> Result<()> {
        let name = unit.to_string();
        let status = tokio::task::spawn_blocking(move || SystemCtl::default().restart(&name))
            .await
            .map_err(|e| Error::Io("systemctl task failed", e.into()))?
            .map_err(|e| Error::Io("failed to restart service", e))?;

        check("restart", unit, status)
    }
}

/// Hex SHA-256 of a descriptor.
#[must_use]
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// A unit file on disk plus the hash of its last activated content.
#[derive(Clone, Debug)]
pub struct ServiceUnit<M>
where
    M: ServiceManager,
{
    hash_file: PathBuf,
    manager: M,
    name: String,
    unit_file: PathBuf,
}

impl<M> ServiceUnit<M>
where
    M: ServiceManager,
{
    /// Creates a new `ServiceUnit`.
    pub fn new(
        name: impl Into<String>,
        unit_file: impl Into<PathBuf>,
        hash_file: impl Into<PathBuf>,
        manager: M,
    ) -> Self {
        Self {
            hash_file: hash_file.into(),
            manager,
            name: name.into(),
            unit_file: unit_file.into(),
        }
    }

    /// The unit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the unit file.
    #[must_use]
    pub fn unit_file(&self) -> &Path {
        &self.unit_file
    }

    async fn stored_hash(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.hash_file).await {
            Ok(hash) => Ok(Some(hash.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io("failed to read descriptor hash", e)),
        }
    }

    async fn write(path: &Path, content: &str, context: &'static str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Io(context, e))?;
        }

        tokio::fs::write(path, content)
            .await
            .map_err(|e| Error::Io(context, e))
    }

    /// Writes `content` as the unit file unless its hash matches the last
    /// activation. Restarts the service only when `running`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written or a service-manager
    /// command fails.
    pub async fn activate(&self, content: &str, running: bool) -> Result<Activation> {
        let hash = content_hash(content);

        if self.stored_hash().await?.as_deref() == Some(hash.as_str()) {
            debug!("descriptor for {} unchanged ({})", self.name, hash);
            return Ok(Activation::Unchanged);
        }

        Self::write(&self.unit_file, content, "failed to write unit file").await?;
        info!("wrote {} ({})", self.unit_file.display(), hash);

        self.manager.daemon_reload().await?;

        let activation = if running {
            info!("restarting {} for the new descriptor", self.name);
            self.manager.restart(&self.name).await?;
            Activation::Restarted
        } else {
            Activation::Reloaded
        };

        // Recorded last so a failed reload or restart is retried.
        Self::write(&self.hash_file, &hash, "failed to write descriptor hash").await?;

        Ok(activation)
    }

    /// Starts the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the service manager fails.
    pub async fn start(&self) -> Result<()> {
        info!("starting {}", self.name);
        self.manager.start(&self.name).await
    }

    /// Restarts the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the service manager fails.
    pub async fn restart(&self) -> Result<()> {
        info!("restarting {}", self.name);
        self.manager.restart(&self.name).await
    }
}
