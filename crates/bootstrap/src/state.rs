use crate::error::{Error, Result};
use crate::notification::Notification;
use crate::status::UnitStatus;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-unit facts that survive between invocations.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UnitState {
    /// Install completed.
    #[serde(default)]
    pub installed: bool,

    /// The database service was started by this unit.
    #[serde(default)]
    pub started: bool,

    /// Last reported status.
    #[serde(default)]
    pub status: UnitStatus,
}

/// Everything persisted between invocations.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct LocalState {
    /// Coordinator state.
    #[serde(flatten)]
    pub unit: UnitState,

    /// Notifications still waiting to be handled, in delivery order.
    #[serde(default)]
    pub deferred: Vec<Notification>,
}

/// Storage for [`LocalState`].
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Loads the state, or the default when nothing was saved yet.
    async fn load(&self) -> Result<LocalState>;

    /// Replaces the saved state.
    async fn save(&self, state: &LocalState) -> Result<()>;
}

/// [`StateStore`] writing JSON to a file.
#[derive(Clone, Debug)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Creates a new `FileStateStore` at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<LocalState> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no state at {}, starting fresh", self.path.display());
                Ok(LocalState::default())
            }
            Err(e) => Err(Error::Io("failed to read state file", e)),
        }
    }

    async fn save(&self, state: &LocalState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Io("failed to create state directory", e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::Io("failed to write state file", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Io("failed to replace state file", e))
    }
}

/// In-memory [`StateStore`]. Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct MemoryStateStore {
    state: Arc<Mutex<LocalState>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the saved state.
    #[must_use]
    pub fn snapshot(&self) -> LocalState {
        self.state.lock().clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<LocalState> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &LocalState) -> Result<()> {
        *self.state.lock() = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));

        assert_eq!(store.load().await.unwrap(), LocalState::default());
    }

    #[tokio::test]
    async fn test_file_store_persists_deferred_notifications() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested/state.json"));
        let state = LocalState {
            unit: UnitState {
                installed: true,
                started: true,
                status: UnitStatus::Waiting("waiting".to_string()),
            },
            deferred: vec![Notification::Started, Notification::PeerRelationChanged],
        };

        store.save(&state).await.unwrap();

        assert_eq!(store.load().await.unwrap(), state);
        assert!(!dir.path().join("nested/state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_reads_flat_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"started": true, "deferred": ["started"]}"#).unwrap();

        let state = FileStateStore::new(&path).load().await.unwrap();

        assert!(state.unit.started);
        assert!(!state.unit.installed);
        assert_eq!(state.unit.status, UnitStatus::Unset);
        assert_eq!(state.deferred, vec![Notification::Started]);
    }
}
