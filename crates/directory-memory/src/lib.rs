//! In-memory peer group for tests and local simulations of several units
//! sharing one relation.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use crdb_directory::{Databag, INGRESS_ADDRESS_KEY, Relation};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct GroupState {
    bindings: HashMap<String, String>,
    group: Databag,
    group_writes: usize,
    leader: Option<String>,
    members: BTreeMap<String, Databag>,
}

/// A peer group shared between any number of [`MemoryRelation`] handles.
#[derive(Clone, Debug, Default)]
pub struct MemoryPeerGroup {
    state: Arc<Mutex<GroupState>>,
}

impl MemoryPeerGroup {
    /// Creates an empty peer group with no leader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a relation handle for `unit`, bound to `address`. The unit is
    /// not joined until [`MemoryPeerGroup::join`] is called.
    #[must_use]
    pub fn unit(&self, unit: impl Into<String>, address: impl Into<String>) -> MemoryRelation {
        let unit = unit.into();
        self.state.lock().bindings.insert(unit.clone(), address.into());

        MemoryRelation {
            group: self.clone(),
            unit,
        }
    }

    /// Establishes the relation for `unit` and publishes its bound address.
    pub fn join(&self, unit: &str) {
        let mut state = self.state.lock();
        let address = state.bindings.get(unit).cloned().unwrap_or_default();

        state
            .members
            .entry(unit.to_string())
            .or_default()
            .insert(INGRESS_ADDRESS_KEY.to_string(), address);
    }

    /// Hands leadership to `unit`.
    pub fn set_leader(&self, unit: &str) {
        self.state.lock().leader = Some(unit.to_string());
    }

    /// Current leader, if any.
    #[must_use]
    pub fn leader(&self) -> Option<String> {
        self.state.lock().leader.clone()
    }

    /// Snapshot of the group-scope data.
    #[must_use]
    pub fn group_data(&self) -> Databag {
        self.state.lock().group.clone()
    }

    /// Number of successful group-scope writes so far.
    #[must_use]
    pub fn group_writes(&self) -> usize {
        self.state.lock().group_writes
    }
}

/// One unit's handle on a [`MemoryPeerGroup`].
#[derive(Clone, Debug)]
pub struct MemoryRelation {
    group: MemoryPeerGroup,
    unit: String,
}

impl MemoryRelation {
    /// Joins the peer group (see [`MemoryPeerGroup::join`]).
    pub fn join(&self) {
        self.group.join(&self.unit);
    }

    /// The group this handle belongs to.
    #[must_use]
    pub const fn group(&self) -> &MemoryPeerGroup {
        &self.group
    }
}

#[async_trait]
impl Relation for MemoryRelation {
    type Error = Error;

    fn local_unit(&self) -> &str {
        &self.unit
    }

    async fn is_established(&self) -> Result<bool, Self::Error> {
        Ok(self.group.state.lock().members.contains_key(&self.unit))
    }

    async fn is_leader(&self) -> Result<bool, Self::Error> {
        Ok(self.group.state.lock().leader.as_deref() == Some(self.unit.as_str()))
    }

    async fn binding_address(&self) -> Result<Option<String>, Self::Error> {
        Ok(self.group.state.lock().bindings.get(&self.unit).cloned())
    }

    async fn members(&self) -> Result<Vec<String>, Self::Error> {
        Ok(self
            .group
            .state
            .lock()
            .members
            .keys()
            .filter(|name| **name != self.unit)
            .cloned()
            .collect())
    }

    async fn member_data(&self, unit: &str) -> Result<Databag, Self::Error> {
        Ok(self
            .group
            .state
            .lock()
            .members
            .get(unit)
            .cloned()
            .unwrap_or_default())
    }

    async fn group_data(&self) -> Result<Databag, Self::Error> {
        Ok(self.group.state.lock().group.clone())
    }

    async fn write_member_data(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let mut state = self.group.state.lock();
        let data = state
            .members
            .get_mut(&self.unit)
            .ok_or_else(|| Error::NotJoined(self.unit.clone()))?;

        data.insert(key.to_string(), value.to_string());

        Ok(())
    }

    async fn write_group_data_if_absent(&self, entries: &Databag) -> Result<bool, Self::Error> {
        let mut state = self.group.state.lock();

        if state.leader.as_deref() != Some(self.unit.as_str()) {
            return Err(Error::NotLeader(self.unit.clone()));
        }

        if entries.keys().any(|key| state.group.contains_key(key)) {
            return Ok(false);
        }

        state
            .group
            .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        state.group_writes += 1;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_publishes_binding_address() {
        let group = MemoryPeerGroup::new();
        let a = group.unit("cockroachdb/0", "10.0.0.1");
        let b = group.unit("cockroachdb/1", "10.0.0.2");

        assert!(!a.is_established().await.unwrap());

        a.join();
        b.join();

        assert!(a.is_established().await.unwrap());
        assert_eq!(a.members().await.unwrap(), vec!["cockroachdb/1".to_string()]);
        assert_eq!(
            a.member_data("cockroachdb/1")
                .await
                .unwrap()
                .get(INGRESS_ADDRESS_KEY)
                .map(String::as_str),
            Some("10.0.0.2")
        );
    }

    #[tokio::test]
    async fn test_group_write_requires_leadership() {
        let group = MemoryPeerGroup::new();
        let a = group.unit("cockroachdb/0", "10.0.0.1");
        a.join();

        let entries = Databag::from([("k".to_string(), "v".to_string())]);
        let result = a.write_group_data_if_absent(&entries).await;

        assert!(matches!(result, Err(Error::NotLeader(_))));
        assert!(group.group_data().is_empty());
    }

    #[tokio::test]
    async fn test_group_write_is_write_once() {
        let group = MemoryPeerGroup::new();
        let a = group.unit("cockroachdb/0", "10.0.0.1");
        let b = group.unit("cockroachdb/1", "10.0.0.2");
        a.join();
        b.join();

        group.set_leader("cockroachdb/0");
        let first = Databag::from([("k".to_string(), "first".to_string())]);
        assert!(a.write_group_data_if_absent(&first).await.unwrap());

        group.set_leader("cockroachdb/1");
        let second = Databag::from([("k".to_string(), "second".to_string())]);
        assert!(!b.write_group_data_if_absent(&second).await.unwrap());

        assert_eq!(group.group_data().get("k").map(String::as_str), Some("first"));
        assert_eq!(group.group_writes(), 1);
    }

    #[tokio::test]
    async fn test_member_write_before_join_fails() {
        let group = MemoryPeerGroup::new();
        let a = group.unit("cockroachdb/0", "10.0.0.1");

        assert!(matches!(
            a.write_member_data("k", "v").await,
            Err(Error::NotJoined(_))
        ));
    }
}
