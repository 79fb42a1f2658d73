//! Peer relation backed by a directory shared between units (for example a
//! network mount), used by the agent outside of a managed host.
//!
//! Layout under the root:
//!
//! - `leader`: name of the unit currently holding leadership
//! - `group.json`: group-scope data
//! - `units/<unit>.json`: member-scope data of each joined unit
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use crdb_directory::{Databag, INGRESS_ADDRESS_KEY, Relation};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

const GROUP_FILE: &str = "group.json";
const LEADER_FILE: &str = "leader";
const UNITS_DIR: &str = "units";

#[derive(Debug, Default, Deserialize, Serialize)]
struct MemberFile {
    unit: String,
    data: Databag,
}

/// A unit's view of a relation stored under a shared directory.
#[derive(Clone, Debug)]
pub struct FsRelation {
    address: Option<String>,
    root: PathBuf,
    unit: String,
}

impl FsRelation {
    /// Creates a new `FsRelation` for `unit` rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, unit: impl Into<String>, address: Option<String>) -> Self {
        Self {
            address,
            root: root.into(),
            unit: unit.into(),
        }
    }

    /// Establishes the relation by writing this unit's member file with its
    /// ingress address. Existing member data is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the member file cannot be written.
    pub async fn join(&self) -> Result<(), Error> {
        let mut member = self
            .read_member(&self.member_path(&self.unit))
            .await?
            .unwrap_or_else(|| MemberFile {
                unit: self.unit.clone(),
                data: Databag::new(),
            });

        if let Some(address) = &self.address {
            member
                .data
                .insert(INGRESS_ADDRESS_KEY.to_string(), address.clone());
        }

        self.write_member(&member).await
    }

    /// Takes leadership unless some unit already holds it. Returns whether
    /// the local unit is the leader afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the leader file cannot be created or read.
    pub async fn claim_leadership(&self) -> Result<bool, Error> {
        if self.create_once(LEADER_FILE, self.unit.as_bytes()).await? {
            debug!("{} claimed leadership", self.unit);
            return Ok(true);
        }

        self.is_leader().await
    }

    /// Root directory of the relation.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn member_path(&self, unit: &str) -> PathBuf {
        self.root
            .join(UNITS_DIR)
            .join(format!("{}.json", encode_unit(unit)))
    }

    /// Creates `name` under the root with `bytes` unless it already exists.
    /// The content is staged in a private file and hard-linked into place, so
    /// readers never observe a partially written file.
    async fn create_once(&self, name: &str, bytes: &[u8]) -> Result<bool, Error> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Io("error creating directory", e))?;

        let path = self.root.join(name);
        let staged = self
            .root
            .join(format!(".{name}.{}.tmp", encode_unit(&self.unit)));

        fs::write(&staged, bytes)
            .await
            .map_err(|e| Error::Io("error writing temporary file", e))?;
        let linked = fs::hard_link(&staged, &path).await;

        if let Err(e) = fs::remove_file(&staged).await {
            debug!("failed to remove {:?}: {}", staged, e);
        }

        match linked {
            Ok(()) => Ok(true),
            Err(ref e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::Io("error publishing file", e)),
        }
    }

    async fn read_member(&self, path: &Path) -> Result<Option<MemberFile>, Error> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io("error reading member file", e)),
        }
    }

    async fn write_member(&self, member: &MemberFile) -> Result<(), Error> {
        let path = self.member_path(&member.unit);
        let bytes = serde_json::to_vec_pretty(member)?;

        write_atomic(&path, &bytes).await
    }

    async fn read_group(&self) -> Result<Option<Databag>, Error> {
        match fs::read(self.root.join(GROUP_FILE)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io("error reading group file", e)),
        }
    }
}

/// File stem for a unit name. `%` and `/` are escaped so distinct names
/// never share a file.
fn encode_unit(unit: &str) -> String {
    unit.replace('%', "%25").replace('/', "%2F")
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Io("error creating directory", e))?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| Error::Io("error writing temporary file", e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Io("error renaming temporary file", e))?;

    Ok(())
}

#[async_trait]
impl Relation for FsRelation {
    type Error = Error;

    fn local_unit(&self) -> &str {
        &self.unit
    }

    async fn is_established(&self) -> Result<bool, Self::Error> {
        fs::try_exists(self.member_path(&self.unit))
            .await
            .map_err(|e| Error::Io("error checking member file", e))
    }

    async fn is_leader(&self) -> Result<bool, Self::Error> {
        match fs::read_to_string(self.root.join(LEADER_FILE)).await {
            Ok(leader) => Ok(leader.trim() == self.unit),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io("error reading leader file", e)),
        }
    }

    async fn binding_address(&self) -> Result<Option<String>, Self::Error> {
        Ok(self.address.clone())
    }

    async fn members(&self) -> Result<Vec<String>, Self::Error> {
        let mut entries = match fs::read_dir(self.root.join(UNITS_DIR)).await {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io("error reading units directory", e)),
        };
        let mut members = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Io("error reading units directory entry", e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            match self.read_member(&path).await {
                Ok(Some(member)) if member.unit != self.unit => members.push(member.unit),
                Ok(_) => {}
                Err(e) => debug!("skipping unreadable member file {:?}: {}", path, e),
            }
        }

        members.sort();

        Ok(members)
    }

    async fn member_data(&self, unit: &str) -> Result<Databag, Self::Error> {
        Ok(self
            .read_member(&self.member_path(unit))
            .await?
            .map(|member| member.data)
            .unwrap_or_default())
    }

    async fn group_data(&self) -> Result<Databag, Self::Error> {
        Ok(self.read_group().await?.unwrap_or_default())
    }

    async fn write_member_data(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let mut member = self
            .read_member(&self.member_path(&self.unit))
            .await?
            .ok_or_else(|| Error::NotJoined(self.unit.clone()))?;

        member.data.insert(key.to_string(), value.to_string());

        self.write_member(&member).await
    }

    async fn write_group_data_if_absent(&self, entries: &Databag) -> Result<bool, Self::Error> {
        if !self.is_leader().await? {
            return Err(Error::NotLeader(self.unit.clone()));
        }

        let path = self.root.join(GROUP_FILE);

        match self.read_group().await? {
            // Losing the creation race leaves whatever is there now.
            None => {
                self.create_once(GROUP_FILE, &serde_json::to_vec_pretty(entries)?)
                    .await
            }
            Some(mut group) => {
                if entries.keys().any(|key| group.contains_key(key)) {
                    return Ok(false);
                }

                group.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
                write_atomic(&path, &serde_json::to_vec_pretty(&group)?).await?;

                Ok(true)
            }
        }
    }
}
