use crate::Cli;
use crate::error::{Error, Result};

use std::collections::BTreeMap;
use std::time::Duration;

use crdb_bootstrap::Notification;
use crdb_directory::{Databag, Relation};
use crdb_directory_fs::FsRelation;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info};

/// Everything a peer-relation change can alter.
#[derive(Debug, Default, Eq, PartialEq)]
struct DirectorySnapshot {
    group: Databag,
    members: BTreeMap<String, Databag>,
}

impl DirectorySnapshot {
    async fn read(relation: &FsRelation) -> Result<Self> {
        let mut members = BTreeMap::new();

        for member in relation.members().await? {
            let data = relation.member_data(&member).await?;
            members.insert(member, data);
        }

        Ok(Self {
            group: relation.group_data().await?,
            members,
        })
    }
}

/// Joins the peers and claims leadership if nobody holds it, completes
/// install and start if they never finished, then polls config and
/// directory for changes until stopped.
pub async fn run(cli: &Cli, interval: u64) -> Result<()> {
    let mut config = super::load_config(cli)?;
    let mut dispatcher = super::dispatcher(cli, config.clone()).await?;
    let relation = dispatcher.coordinator().directory().relation().clone();

    relation.join().await?;
    info!("{} joined peers at {}", cli.unit, relation.root().display());

    if relation.claim_leadership().await? {
        info!("{} is the leader", cli.unit);
    }

    let state = dispatcher.coordinator().state().clone();
    if !state.installed {
        dispatcher.enqueue(Notification::Install);
    }
    if !state.started && !state.status.is_blocked() {
        dispatcher.enqueue(Notification::Start);
    }
    dispatcher.enqueue(Notification::PeerRelationChanged);
    dispatcher.dispatch().await?;

    let mut snapshot = DirectorySnapshot::read(&relation).await?;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::Io("failed to create SIGTERM signal", e))?;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }

        let latest = super::load_config(cli)?;
        if latest != config {
            debug!("configuration changed: {:?}", latest);
            dispatcher.coordinator_mut().set_config(latest.clone());
            dispatcher.enqueue(Notification::ConfigChanged);
            config = latest;
        }

        let latest = DirectorySnapshot::read(&relation).await?;
        if latest != snapshot {
            debug!("peer directory changed");
            dispatcher.enqueue(Notification::PeerRelationChanged);
            snapshot = latest;
        }

        if !dispatcher.pending().is_empty() {
            let report = dispatcher.dispatch().await?;
            debug!(
                "round: {} handled, {} deferred, status {}",
                report.handled,
                report.deferred,
                dispatcher.coordinator().status()
            );
        }
    }

    dispatcher.persist().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[tokio::test]
    async fn test_snapshot_changes_when_peer_joins() {
        let dir = tempdir().unwrap();
        let local = FsRelation::new(dir.path(), "cockroachdb/0", Some("10.0.0.1".to_string()));
        let peer = FsRelation::new(dir.path(), "cockroachdb/1", Some("10.0.0.2".to_string()));

        local.join().await.unwrap();
        let before = DirectorySnapshot::read(&local).await.unwrap();

        peer.join().await.unwrap();
        let after = DirectorySnapshot::read(&local).await.unwrap();

        assert_ne!(before, after);
        assert_eq!(after.members.len(), 1);
        assert_eq!(DirectorySnapshot::read(&local).await.unwrap(), after);
    }
}
