use crate::error::{Error, Result};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default CockroachDB release.
pub const DEFAULT_VERSION: &str = "v19.2.2";

/// Default replication factor of both the default zone and system data.
pub const DEFAULT_REPLICAS: u32 = 3;

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

const fn default_replicas() -> u32 {
    DEFAULT_REPLICAS
}

/// Operator configuration of a unit.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Config {
    /// Release to install, e.g. `v19.2.2`.
    #[serde(default = "default_version")]
    pub version: String,

    /// Replication factor of the default zone.
    #[serde(default = "default_replicas")]
    pub default_zone_replicas: u32,

    /// Replication factor of system data.
    #[serde(default = "default_replicas")]
    pub system_data_replicas: u32,

    /// Pre-fetched release tarball, used instead of downloading.
    #[serde(default)]
    pub resource: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            default_zone_replicas: DEFAULT_REPLICAS,
            system_data_replicas: DEFAULT_REPLICAS,
            resource: None,
        }
    }
}

impl Config {
    /// Both replication factors being 1 is taken as the operator asking for
    /// a single-node deployment.
    #[must_use]
    pub const fn is_single_node(&self) -> bool {
        self.default_zone_replicas == 1 && self.system_data_replicas == 1
    }

    /// Loads the configuration from a JSON file. Missing keys take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Io("failed to read config file", e))?;

        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.version, "v19.2.2");
        assert!(!config.is_single_node());
    }

    #[test]
    fn test_single_node_requires_both_factors() {
        let mut config = Config {
            default_zone_replicas: 1,
            ..Config::default()
        };
        assert!(!config.is_single_node());

        config.system_data_replicas = 1;
        assert!(config.is_single_node());
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"version": "v20.1.0", "default_zone_replicas": 1, "resource": "/tmp/cockroach.tgz"}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();

        assert_eq!(
            config,
            Config {
                version: "v20.1.0".to_string(),
                default_zone_replicas: 1,
                system_data_replicas: 3,
                resource: Some(PathBuf::from("/tmp/cockroach.tgz")),
            }
        );
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempdir().unwrap();

        assert!(matches!(
            Config::from_file(&dir.path().join("missing.json")),
            Err(Error::Io(..))
        ));
    }
}
