use crdb_directory::{RelationError, RelationErrorKind};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// A data file could not be decoded.
    #[error("invalid relation data: {0}")]
    Json(#[from] serde_json::Error),

    /// Group-scope write by a unit that is not the leader.
    #[error("unit {0} is not the leader")]
    NotLeader(String),

    /// Member-scope write before the unit joined.
    #[error("unit {0} has not joined the peer group")]
    NotJoined(String),
}

impl RelationError for Error {
    fn kind(&self) -> RelationErrorKind {
        match self {
            Self::NotLeader(_) => RelationErrorKind::NotLeader,
            Self::NotJoined(_) => RelationErrorKind::NotEstablished,
            Self::Io(..) | Self::Json(_) => RelationErrorKind::Backend,
        }
    }
}
