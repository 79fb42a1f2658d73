//! Abstract interface over the shared peer-group data used to coordinate
//! cluster bootstrap between units.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod error;
mod identity;

pub use error::{Error, RelationError, RelationErrorKind};
pub use identity::ClusterIdentity;

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

/// String-keyed, string-valued data bag as exchanged over the relation.
pub type Databag = BTreeMap<String, String>;

/// Member-scope key holding a unit's reachable address.
pub const INGRESS_ADDRESS_KEY: &str = "ingress-address";

/// Group-scope key naming the unit that initialized the cluster.
pub const INITIAL_UNIT_KEY: &str = "initial_unit";

/// Group-scope key holding the cluster id.
pub const CLUSTER_ID_KEY: &str = "cluster_id";

/// Address advertised when the host has no binding address for the unit.
pub const FALLBACK_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Backend view of the peer relation, as seen by one local unit.
///
/// Member scopes are writable only by their owner, so the only member write
/// offered here targets the local unit. The group scope is writable only by
/// the current leader and implementations must enforce that themselves
/// rather than trusting callers.
#[async_trait]
pub trait Relation: Clone + Send + Sync + 'static {
    /// The error type for relation operations.
    type Error: RelationError;

    /// Name of the local unit.
    fn local_unit(&self) -> &str;

    /// Whether the peer relation exists for the local unit.
    async fn is_established(&self) -> Result<bool, Self::Error>;

    /// Whether the local unit currently holds leadership.
    async fn is_leader(&self) -> Result<bool, Self::Error>;

    /// The address the host has bound for the local unit, if any.
    async fn binding_address(&self) -> Result<Option<String>, Self::Error>;

    /// Names of the other units whose member data has been observed.
    async fn members(&self) -> Result<Vec<String>, Self::Error>;

    /// Member-scope data of the given unit.
    async fn member_data(&self, unit: &str) -> Result<Databag, Self::Error>;

    /// Group-scope data.
    async fn group_data(&self) -> Result<Databag, Self::Error>;

    /// Writes a key into the local unit's member scope.
    async fn write_member_data(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Writes `entries` into the group scope unless any of the keys is
    /// already present.
    ///
    /// Returns `false` (and writes nothing) when a key already exists. Fails
    /// with [`RelationErrorKind::NotLeader`] when the local unit is not the
    /// leader.
    async fn write_group_data_if_absent(&self, entries: &Databag) -> Result<bool, Self::Error>;
}

/// Typed view over a [`Relation`] exposing the bootstrap-relevant facts.
#[derive(Clone, Debug)]
pub struct PeerDirectory<R>
where
    R: Relation,
{
    relation: R,
}

impl<R> PeerDirectory<R>
where
    R: Relation,
{
    /// Creates a new `PeerDirectory` over the given relation.
    pub const fn new(relation: R) -> Self {
        Self { relation }
    }

    /// Name of the local unit.
    pub fn unit_name(&self) -> &str {
        self.relation.local_unit()
    }

    /// Access to the underlying relation.
    pub const fn relation(&self) -> &R {
        &self.relation
    }

    fn map_err(&self, error: R::Error) -> Error {
        Error::from_relation(self.relation.local_unit(), error)
    }

    /// True once the peer relation exists, whether or not any peer has
    /// appeared yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn is_joined(&self) -> Result<bool, Error> {
        self.relation
            .is_established()
            .await
            .map_err(|e| self.map_err(e))
    }

    /// Whether the local unit is currently the leader.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn is_leader(&self) -> Result<bool, Error> {
        self.relation.is_leader().await.map_err(|e| self.map_err(e))
    }

    /// Ingress addresses of every other known member.
    ///
    /// Order follows the backend's iteration order and carries no meaning.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn peer_addresses(&self) -> Result<Vec<String>, Error> {
        if !self.is_joined().await? {
            return Ok(Vec::new());
        }

        let members = self.relation.members().await.map_err(|e| self.map_err(e))?;
        let mut addresses = Vec::with_capacity(members.len());

        for member in members {
            let data = self
                .relation
                .member_data(&member)
                .await
                .map_err(|e| self.map_err(e))?;

            match data.get(INGRESS_ADDRESS_KEY) {
                Some(address) if !address.is_empty() => addresses.push(address.clone()),
                _ => debug!("member {} has not published an ingress address yet", member),
            }
        }

        Ok(addresses)
    }

    /// The local unit's own address, falling back to loopback so a unit
    /// that has not joined can still render a usable descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn advertise_address(&self) -> Result<String, Error> {
        let address = self
            .relation
            .binding_address()
            .await
            .map_err(|e| self.map_err(e))?;

        Ok(address
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| FALLBACK_ADDRESS.to_string()))
    }

    async fn group_value(&self, key: &str) -> Result<Option<String>, Error> {
        if !self.is_joined().await? {
            return Ok(None);
        }

        let data = self
            .relation
            .group_data()
            .await
            .map_err(|e| self.map_err(e))?;

        Ok(data.get(key).filter(|v| !v.is_empty()).cloned())
    }

    /// Whether a cluster id has been recorded for the group. False when not
    /// joined.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn is_cluster_initialized(&self) -> Result<bool, Error> {
        Ok(self.group_value(CLUSTER_ID_KEY).await?.is_some())
    }

    /// The unit that initialized the cluster, if joined and recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn initial_unit(&self) -> Result<Option<String>, Error> {
        self.group_value(INITIAL_UNIT_KEY).await
    }

    /// The recorded cluster identity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the stored cluster
    /// id is not a UUID.
    pub async fn cluster_identity(&self) -> Result<Option<ClusterIdentity>, Error> {
        let Some(cluster_id) = self.group_value(CLUSTER_ID_KEY).await? else {
            return Ok(None);
        };

        let cluster_id =
            Uuid::parse_str(&cluster_id).map_err(|_| Error::InvalidClusterId(cluster_id))?;
        let initial_unit = self.group_value(INITIAL_UNIT_KEY).await?.unwrap_or_default();

        Ok(Some(ClusterIdentity {
            initial_unit,
            cluster_id,
        }))
    }

    /// Records the cluster identity in the group scope.
    ///
    /// Only the leader may call this. Returns `false` when an identity was
    /// already present, in which case nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractViolation`] when the local unit is not the
    /// leader and [`Error::NotJoined`] when the relation does not exist.
    pub async fn publish_cluster_identity(&self, identity: &ClusterIdentity) -> Result<bool, Error> {
        if !self.is_leader().await? {
            return Err(Error::ContractViolation(self.unit_name().to_string()));
        }

        if !self.is_joined().await? {
            return Err(Error::NotJoined);
        }

        let written = self
            .relation
            .write_group_data_if_absent(&identity.to_databag())
            .await
            .map_err(|e| self.map_err(e))?;

        if written {
            info!(
                "recorded cluster identity {} (initial unit {})",
                identity.cluster_id, identity.initial_unit
            );
        } else {
            debug!("cluster identity already recorded, leaving it untouched");
        }

        Ok(written)
    }

    /// Publishes the local unit's ingress address into its member scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    pub async fn publish_ingress_address(&self, address: &str) -> Result<(), Error> {
        self.relation
            .write_member_data(INGRESS_ADDRESS_KEY, address)
            .await
            .map_err(|e| self.map_err(e))
    }
}
