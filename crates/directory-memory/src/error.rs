use crdb_directory::{RelationError, RelationErrorKind};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
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
        }
    }
}
