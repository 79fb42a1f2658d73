use crate::{CLUSTER_ID_KEY, Databag, INITIAL_UNIT_KEY};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The `(initial unit, cluster id)` pair marking one-time cluster
/// initialization.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterIdentity {
    /// Unit that performed the initialization.
    pub initial_unit: String,

    /// Id reported by the initialized cluster.
    pub cluster_id: Uuid,
}

impl ClusterIdentity {
    /// Group-scope entries for this identity.
    #[must_use]
    pub fn to_databag(&self) -> Databag {
        Databag::from([
            (INITIAL_UNIT_KEY.to_string(), self.initial_unit.clone()),
            (CLUSTER_ID_KEY.to_string(), self.cluster_id.to_string()),
        ])
    }
}
