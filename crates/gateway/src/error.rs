use std::path::PathBuf;

use thiserror::Error;

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// `cockroach init` failed.
    #[error("cluster initialization failed (exit code {code:?}): {stderr}")]
    Init {
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },

    /// The node stayed in "waiting for init" for every attempt.
    #[error("cluster id unavailable after {0} attempts")]
    ClusterIdUnavailable(u32),

    /// gossip-values succeeded but printed no cluster id.
    #[error("could not find cluster-id in the gossip-values output")]
    ClusterIdNotFound,

    /// Downloading or extracting the binary failed.
    #[error("install failed: {0}: {1}")]
    Install(
        &'static str,
        #[source] Box<dyn std::error::Error + Send + Sync>,
    ),

    /// The archive has no `cockroach*/cockroach` entry.
    #[error("no cockroach binary found in archive {0:?}")]
    InstallMissingBinary(PathBuf),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A service-manager command exited unsuccessfully.
    #[error("systemctl {action} {unit} exited with code {code:?}")]
    ServiceControl {
        /// The systemctl action.
        action: &'static str,
        /// The unit acted upon.
        unit: String,
        /// Exit code, if any.
        code: Option<i32>,
    },

    /// gossip-values failed with something other than "waiting for init".
    #[error("unexpected error returned while trying to obtain gossip-values: {0}")]
    UnexpectedGateway(String),
}
