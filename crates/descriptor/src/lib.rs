//! Renders the service-manager unit that runs CockroachDB.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::path::{Path, PathBuf};

static UNIT_TEMPLATE: &str = include_str!("../templates/cockroachdb.service");

/// Default location of the database binary.
pub const DEFAULT_BINARY_PATH: &str = "/usr/local/bin/cockroach";

/// Default working directory of the database process.
pub const DEFAULT_WORKING_DIRECTORY: &str = "/var/lib/cockroach";

/// Default OS user the database process runs as.
pub const DEFAULT_USER: &str = "cockroach";

/// Inputs to [`render`].
#[derive(Clone, Debug)]
pub struct RenderOptions<'a> {
    /// Address the node advertises to its peers.
    pub advertise_address: &'a str,

    /// Path to the database binary.
    pub binary_path: &'a Path,

    /// Whether the peer relation exists. Peers are only joined when it does.
    pub joined: bool,

    /// Addresses of the other known members.
    pub peer_addresses: &'a [String],

    /// Whether both replication factors are 1.
    pub single_node: bool,

    /// OS user to run the process as.
    pub user: &'a str,

    /// Working directory of the process.
    pub working_directory: &'a Path,
}

/// Paths and user shared by every rendering on a node.
#[derive(Clone, Debug)]
pub struct ServiceLayout {
    /// Path to the database binary.
    pub binary_path: PathBuf,

    /// OS user to run the process as.
    pub user: String,

    /// Working directory of the process.
    pub working_directory: PathBuf,
}

impl Default for ServiceLayout {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from(DEFAULT_BINARY_PATH),
            user: DEFAULT_USER.to_string(),
            working_directory: PathBuf::from(DEFAULT_WORKING_DIRECTORY),
        }
    }
}

/// The `--join` list: self first, then peers when joined.
#[must_use]
pub fn join_addresses(advertise_address: &str, joined: bool, peer_addresses: &[String]) -> String {
    let mut addresses = vec![advertise_address];

    if joined {
        addresses.extend(peer_addresses.iter().map(String::as_str));
    }

    addresses.join(",")
}

/// The command line that starts the database process.
#[must_use]
pub fn exec_start(options: &RenderOptions<'_>) -> String {
    let binary = options.binary_path.display();

    if options.single_node {
        // start-single-node sets the replication factor of every zone to 1.
        format!(
            "{binary} start-single-node --advertise-addr={} --insecure",
            options.advertise_address
        )
    } else {
        format!(
            "{binary} start --insecure --advertise-addr={} --join={}",
            options.advertise_address,
            join_addresses(
                options.advertise_address,
                options.joined,
                options.peer_addresses
            )
        )
    }
}

/// Renders the full unit file. No side effects.
#[must_use]
pub fn render(options: &RenderOptions<'_>) -> String {
    UNIT_TEMPLATE
        .replace(
            "{working_directory}",
            &options.working_directory.to_string_lossy(),
        )
        .replace("{exec_start}", &exec_start(options))
        .replace("{user}", options.user)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn options<'a>(
        single_node: bool,
        joined: bool,
        peer_addresses: &'a [String],
        layout: &'a ServiceLayout,
    ) -> RenderOptions<'a> {
        RenderOptions {
            advertise_address: "10.0.0.1",
            binary_path: &layout.binary_path,
            joined,
            peer_addresses,
            single_node,
            user: &layout.user,
            working_directory: &layout.working_directory,
        }
    }

    #[test]
    fn test_single_node_uses_start_single_node() {
        let layout = ServiceLayout::default();
        let peers = vec!["10.0.0.2".to_string()];
        let unit = render(&options(true, true, &peers, &layout));

        assert!(unit.contains(
            "ExecStart=/usr/local/bin/cockroach start-single-node --advertise-addr=10.0.0.1 --insecure\n"
        ));
        assert!(!unit.contains("--join"));
    }

    #[test]
    fn test_multi_node_joins_self_then_peers() {
        let layout = ServiceLayout::default();
        let peers = vec!["10.0.0.2".to_string(), "10.0.0.3".to_string()];

        assert_eq!(
            exec_start(&options(false, true, &peers, &layout)),
            "/usr/local/bin/cockroach start --insecure --advertise-addr=10.0.0.1 --join=10.0.0.1,10.0.0.2,10.0.0.3"
        );
    }

    #[test]
    fn test_multi_node_not_joined_only_lists_self() {
        let layout = ServiceLayout::default();
        let peers = vec!["10.0.0.2".to_string()];

        assert_eq!(join_addresses("10.0.0.1", false, &peers), "10.0.0.1");
        assert!(
            exec_start(&options(false, false, &peers, &layout)).ends_with("--join=10.0.0.1")
        );
    }

    #[test]
    fn test_template_placeholders_are_filled() {
        let layout = ServiceLayout {
            binary_path: PathBuf::from("/opt/cockroach/cockroach"),
            user: "crdb".to_string(),
            working_directory: PathBuf::from("/srv/cockroach"),
        };
        let unit = render(&options(false, false, &[], &layout));

        assert!(unit.contains("WorkingDirectory=/srv/cockroach\n"));
        assert!(unit.contains("User=crdb\n"));
        assert!(unit.contains("ExecStart=/opt/cockroach/cockroach start "));
        assert!(!unit.contains('{'));
    }
}
