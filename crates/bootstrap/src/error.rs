use thiserror::Error;

/// Result alias for bootstrap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling notifications.
#[derive(Debug, Error)]
pub enum Error {
    /// Peer directory error.
    #[error(transparent)]
    Directory(#[from] crdb_directory::Error),

    /// Gateway error.
    #[error(transparent)]
    Gateway(#[from] crdb_gateway::Error),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
