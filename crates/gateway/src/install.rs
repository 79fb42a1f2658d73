use crate::error::{Error, Result};

use std::fs::{self, File, Permissions};
use std::io::{Cursor, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};

/// Default origin of release tarballs.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://binaries.cockroachdb.com";

/// Default directory the binary is installed into.
pub const DEFAULT_INSTALL_DIR: &str = "/usr/local/bin";

const BINARY_NAME: &str = "cockroach";

/// Places the `cockroach` binary from a release tarball into the install
/// directory.
#[derive(Clone, Debug)]
pub struct Installer {
    architecture: String,
    base_url: String,
    client: reqwest::Client,
    install_dir: PathBuf,
}

impl Installer {
    /// Creates a new `Installer`.
    #[must_use]
    pub fn new(install_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            // hard-coded until other architectures matter
            architecture: "amd64".to_string(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            install_dir: install_dir.into(),
        }
    }

    /// Path the binary is installed to.
    #[must_use]
    pub fn binary_path(&self) -> PathBuf {
        self.install_dir.join(BINARY_NAME)
    }

    /// Release tarball URL for `version`.
    #[must_use]
    pub fn download_url(&self, version: &str) -> String {
        format!(
            "{}/cockroach-{version}.linux-{}.tgz",
            self.base_url.trim_end_matches('/'),
            self.architecture
        )
    }

    /// Installs the binary for `version`. A pre-fetched tarball at `resource`
    /// takes precedence over downloading. Safe to re-run.
    ///
    /// # Errors
    ///
    /// Returns an error if the download or the extraction fails.
    pub async fn install(&self, version: &str, resource: Option<&Path>) -> Result<PathBuf> {
        let install_dir = self.install_dir.clone();

        let binary_path = match resource.filter(|path| path.is_file()) {
            Some(resource) => {
                info!("installing cockroach from resource {}", resource.display());

                let resource = resource.to_path_buf();
                tokio::task::spawn_blocking(move || {
                    let file = File::open(&resource)
                        .map_err(|e| Error::Install("failed to open resource", Box::new(e)))?;

                    extract_binary(file, &resource, &install_dir)
                })
                .await
                .map_err(|e| Error::Install("extraction task failed", Box::new(e)))??
            }
            None => {
                let url = self.download_url(version);
                info!("downloading cockroach {} from {}", version, url);

                let archive = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| Error::Install("failed to download release", Box::new(e)))?
                    .bytes()
                    .await
                    .map_err(|e| Error::Install("failed to read release body", Box::new(e)))?;

                tokio::task::spawn_blocking(move || {
                    extract_binary(Cursor::new(archive), Path::new(&url), &install_dir)
                })
                .await
                .map_err(|e| Error::Install("extraction task failed", Box::new(e)))??
            }
        };

        info!("installed cockroach to {}", binary_path.display());

        Ok(binary_path)
    }
}

/// Whether `path` is `cockroach*/cockroach` inside the archive.
fn is_binary_entry(path: &Path) -> bool {
    let components: Vec<_> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    match components.as_slice() {
        [Component::Normal(dir), Component::Normal(file)] => {
            dir.to_string_lossy().starts_with(BINARY_NAME) && file.to_str() == Some(BINARY_NAME)
        }
        _ => false,
    }
}

/// Extracts the binary from a gzipped tarball, replacing any previous
/// install atomically.
fn extract_binary<Rd: Read>(archive: Rd, origin: &Path, install_dir: &Path) -> Result<PathBuf> {
    let mut archive = tar::Archive::new(GzDecoder::new(archive));
    let entries = archive
        .entries()
        .map_err(|e| Error::Install("failed to read archive", Box::new(e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::Install("corrupt archive entry", Box::new(e)))?;
        let path = entry
            .path()
            .map_err(|e| Error::Install("invalid archive path", Box::new(e)))?
            .into_owned();

        if !is_binary_entry(&path) {
            continue;
        }

        debug!("extracting {}", path.display());

        fs::create_dir_all(install_dir)
            .map_err(|e| Error::Io("failed to create install directory", e))?;

        let target = install_dir.join(BINARY_NAME);
        let tmp = install_dir.join(format!(".{BINARY_NAME}.tmp"));

        entry
            .unpack(&tmp)
            .map_err(|e| Error::Install("failed to unpack binary", Box::new(e)))?;
        fs::set_permissions(&tmp, Permissions::from_mode(0o755))
            .map_err(|e| Error::Io("failed to set binary permissions", e))?;
        fs::rename(&tmp, &target).map_err(|e| Error::Io("failed to move binary into place", e))?;

        return Ok(target);
    }

    Err(Error::InstallMissingBinary(origin.to_path_buf()))
}
