use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle notifications delivered to a unit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Notification {
    /// The unit is being installed.
    Install,

    /// The unit should start its workload.
    Start,

    /// Operator configuration changed.
    ConfigChanged,

    /// Peer membership or peer data changed.
    PeerRelationChanged,

    /// Internal: the database service was started on this unit.
    Started,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Install => "install",
            Self::Start => "start",
            Self::ConfigChanged => "config-changed",
            Self::PeerRelationChanged => "peer-relation-changed",
            Self::Started => "started",
        };

        f.write_str(name)
    }
}
