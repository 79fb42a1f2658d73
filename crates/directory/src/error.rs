use std::error::Error as StdError;
use std::fmt::{self, Debug};

use thiserror::Error;

/// Marker trait for `Relation` errors
pub trait RelationError: Debug + StdError + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> RelationErrorKind;
}

/// The kind of relation error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RelationErrorKind {
    /// A group-scope write was attempted by a unit that is not the leader.
    NotLeader,

    /// The relation has not been established for the local unit.
    NotEstablished,

    /// Failure in the backing store.
    Backend,
}

impl fmt::Display for RelationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Errors surfaced by [`crate::PeerDirectory`].
#[derive(Debug, Error)]
pub enum Error {
    /// A non-leader unit tried to record the cluster identity.
    #[error("unit {0} is not the leader and must not record the cluster identity")]
    ContractViolation(String),

    /// The stored cluster id is not a UUID.
    #[error("invalid cluster id in group data: {0}")]
    InvalidClusterId(String),

    /// The peer relation does not exist yet.
    #[error("peer relation is not established")]
    NotJoined,

    /// Backend failure.
    #[error("relation backend error: {0}")]
    Relation(#[source] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn from_relation<E: RelationError>(unit: &str, error: E) -> Self {
        match error.kind() {
            RelationErrorKind::NotLeader => Self::ContractViolation(unit.to_string()),
            RelationErrorKind::NotEstablished => Self::NotJoined,
            RelationErrorKind::Backend => Self::Relation(Box::new(error)),
        }
    }
}
