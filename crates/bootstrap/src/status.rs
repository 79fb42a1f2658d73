use std::fmt;

use serde::{Deserialize, Serialize};

/// Shown when a second unit joins a single-node deployment.
pub const EXTRA_UNIT_MESSAGE: &str = "Extra unit in a single-node deployment.";

/// Shown while a non-leader waits for the cluster identity.
pub const WAITING_FOR_LEADER_MESSAGE: &str = "Waiting for the leader unit to initialize a cluster.";

/// Shown while the leader initializes the cluster.
pub const INITIALIZING_MESSAGE: &str = "Initializing the cluster";

/// Externally observable status of a unit.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    /// Nothing reported yet.
    #[default]
    Unset,

    /// Work in progress.
    Maintenance(String),

    /// Needs operator intervention. Never left on its own.
    Blocked(String),

    /// Waiting on another unit.
    Waiting(String),

    /// Member of an initialized cluster.
    Active,
}

impl UnitStatus {
    /// Whether the unit is blocked.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::Maintenance(message) => write!(f, "maintenance: {message}"),
            Self::Blocked(message) => write!(f, "blocked: {message}"),
            Self::Waiting(message) => write!(f, "waiting: {message}"),
            Self::Active => write!(f, "active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_form() {
        assert_eq!(
            serde_json::to_string(&UnitStatus::Waiting(WAITING_FOR_LEADER_MESSAGE.to_string()))
                .unwrap(),
            r#"{"status":"waiting","message":"Waiting for the leader unit to initialize a cluster."}"#
        );
        assert_eq!(
            serde_json::from_str::<UnitStatus>(r#"{"status":"active"}"#).unwrap(),
            UnitStatus::Active
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            UnitStatus::Blocked(EXTRA_UNIT_MESSAGE.to_string()).to_string(),
            "blocked: Extra unit in a single-node deployment."
        );
    }
}
