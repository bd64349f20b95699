//! Repository sessions.
//!
//! A session is opened once per repository, picks one backend from the
//! repository kind and keeps it for its whole lifetime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use tracing::{debug, info};
use tufmux_metadata::{hash_prefixed_name, RootMetadata, TargetDescriptor, TopLevelRole};

use crate::address::{BackendLocator, FileAddress, OCI_SCHEME};
use crate::config::FetchConfig;
use crate::error::{FetchError, TransportError};
use crate::fetcher::Fetcher;
use crate::filesystem::FilesystemFetcher;
use crate::git_layout::GitLayoutFetcher;
use crate::registry::RegistryFetcher;

/// Directory name targets live under, next to the metadata directory.
pub const TARGETS_DIR: &str = "targets";

/// How a repository is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKind {
    /// Canonical versioned layout on disk or over HTTP.
    Filesystem,
    /// Unversioned working-tree layout with `root_history/`.
    GitLayout,
    /// OCI registry repositories.
    Registry,
}

impl RepositoryKind {
    /// Detect the kind from the configured locations.
    ///
    /// `oci://` metadata means a registry and requires `oci://` targets. A
    /// local metadata directory holding unversioned `timestamp.json`,
    /// `snapshot.json` and `targets.json` is a git layout. Anything else is
    /// served as a plain filesystem or HTTP repository.
    pub fn detect(
        metadata_location: &str,
        targets_location: Option<&str>,
    ) -> Result<Self, FetchError> {
        let metadata_is_registry = metadata_location.starts_with(OCI_SCHEME);
        let targets_is_registry = targets_location.is_some_and(|t| t.starts_with(OCI_SCHEME));

        if metadata_is_registry {
            if targets_location.is_some() && !targets_is_registry {
                return Err(FetchError::configuration(
                    "registry metadata requires registry targets",
                ));
            }
            return Ok(RepositoryKind::Registry);
        }

        if targets_is_registry {
            return Err(FetchError::configuration(
                "registry targets require registry metadata",
            ));
        }

        match local_path(metadata_location)? {
            Some(dir) if is_git_layout(&dir) => Ok(RepositoryKind::GitLayout),
            _ => Ok(RepositoryKind::Filesystem),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryKind::Filesystem => "filesystem",
            RepositoryKind::GitLayout => "git-layout",
            RepositoryKind::Registry => "registry",
        }
    }
}

impl std::fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_git_layout(dir: &Path) -> bool {
    [
        TopLevelRole::Timestamp,
        TopLevelRole::Snapshot,
        TopLevelRole::Targets,
    ]
    .iter()
    .all(|role| dir.join(role.file_name()).is_file())
}

/// The local directory behind a bare path or `file://` URL.
fn local_path(location: &str) -> Result<Option<PathBuf>, FetchError> {
    if location.starts_with("file://") {
        let url = Url::parse(location)
            .map_err(|e| TransportError::InvalidAddress(format!("{location}: {e}")))?;
        let path = url
            .to_file_path()
            .map_err(|_| TransportError::InvalidAddress(location.to_string()))?;
        return Ok(Some(path));
    }
    if location.contains("://") {
        return Ok(None);
    }
    Ok(Some(PathBuf::from(location)))
}

/// Turn a bare local path into an absolute `file://` URL; URLs pass through.
fn normalize_location(location: &str) -> Result<String, FetchError> {
    if location.contains("://") {
        return Ok(location.trim_end_matches('/').to_string());
    }

    let path = std::path::absolute(location)?;
    let url = Url::from_file_path(&path).map_err(|_| {
        TransportError::InvalidAddress(format!("{} is not an absolute path", path.display()))
    })?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// The `targets` sibling of a metadata location.
fn sibling_targets(metadata_url: &str) -> Result<String, FetchError> {
    match metadata_url.rsplit_once('/') {
        Some((parent, _)) if !parent.ends_with('/') => Ok(format!("{parent}/{TARGETS_DIR}")),
        _ => Err(FetchError::configuration(format!(
            "cannot derive a targets location from {metadata_url}"
        ))),
    }
}

/// The closed set of backends.
#[derive(Debug)]
pub enum Backend {
    Filesystem(FilesystemFetcher),
    GitLayout(GitLayoutFetcher),
    Registry(RegistryFetcher),
}

impl Backend {
    /// Build the backend for `kind`.
    pub fn new(
        kind: RepositoryKind,
        metadata_url: &str,
        targets_url: &str,
        config: &FetchConfig,
    ) -> Result<Self, FetchError> {
        Ok(match kind {
            RepositoryKind::Filesystem => Backend::Filesystem(FilesystemFetcher::new(config)?),
            RepositoryKind::GitLayout => {
                Backend::GitLayout(GitLayoutFetcher::new(FilesystemFetcher::new(config)?))
            }
            RepositoryKind::Registry => {
                Backend::Registry(RegistryFetcher::new(metadata_url, targets_url, config)?)
            }
        })
    }

    pub fn kind(&self) -> RepositoryKind {
        match self {
            Backend::Filesystem(_) => RepositoryKind::Filesystem,
            Backend::GitLayout(_) => RepositoryKind::GitLayout,
            Backend::Registry(_) => RepositoryKind::Registry,
        }
    }

    /// Resolve an address without performing I/O.
    pub fn locate(&self, address: &str) -> Result<BackendLocator, FetchError> {
        match self {
            Backend::Filesystem(fetcher) => fetcher.locate(address),
            Backend::GitLayout(fetcher) => fetcher.locate(address),
            Backend::Registry(fetcher) => fetcher.locate(address),
        }
    }
}

#[async_trait]
impl Fetcher for Backend {
    async fn fetch(
        &mut self,
        address: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        match self {
            Backend::Filesystem(fetcher) => fetcher.fetch(address, max_length, timeout).await,
            Backend::GitLayout(fetcher) => fetcher.fetch(address, max_length, timeout).await,
            Backend::Registry(fetcher) => fetcher.fetch(address, max_length, timeout).await,
        }
    }
}

/// One repository, one backend.
#[derive(Debug)]
pub struct RepositorySession {
    metadata_url: String,
    targets_url: String,
    backend: Backend,
    hash_prefixed_targets: bool,
}

impl RepositorySession {
    /// Open a session.
    ///
    /// `targets_location` defaults to the `targets` sibling of the metadata
    /// location except for registries, where it is required. `kind` overrides
    /// detection.
    pub fn open(
        metadata_location: &str,
        targets_location: Option<&str>,
        kind: Option<RepositoryKind>,
        config: &FetchConfig,
    ) -> Result<Self, FetchError> {
        let kind = match kind {
            Some(kind) => kind,
            None => RepositoryKind::detect(metadata_location, targets_location)?,
        };

        let metadata_url = normalize_location(metadata_location)?;
        let targets_url = match targets_location {
            Some(location) => normalize_location(location)?,
            None if kind == RepositoryKind::Registry => {
                return Err(FetchError::configuration(
                    "a registry repository needs an explicit targets location",
                ))
            }
            None => sibling_targets(&metadata_url)?,
        };

        let backend = Backend::new(kind, &metadata_url, &targets_url, config)?;

        info!(
            kind = %kind,
            metadata = %metadata_url,
            targets = %targets_url,
            "Opened repository session"
        );

        Ok(Self {
            metadata_url,
            targets_url,
            backend,
            hash_prefixed_targets: false,
        })
    }

    pub fn kind(&self) -> RepositoryKind {
        self.backend.kind()
    }

    pub fn metadata_url(&self) -> &str {
        &self.metadata_url
    }

    pub fn targets_url(&self) -> &str {
        &self.targets_url
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Take the target addressing mode from the trusted root.
    ///
    /// A root with `consistent_snapshot` set means targets are stored as
    /// `{hash}.{basename}`. Git working trees never are, whatever the root
    /// says.
    pub fn trust_root(&mut self, root: &RootMetadata) {
        self.hash_prefixed_targets =
            root.consistent_snapshot && self.kind() != RepositoryKind::GitLayout;
        debug!(
            hash_prefixed_targets = self.hash_prefixed_targets,
            root_version = root.version,
            "Applied trusted root"
        );
    }

    /// Whether targets are addressed by `{hash}.{basename}`.
    pub fn hash_prefixed_targets(&self) -> bool {
        self.hash_prefixed_targets
    }

    /// Address of a metadata file, e.g. `2.root.json`.
    pub fn metadata_address(&self, file_name: &str) -> String {
        format!("{}/{}", self.metadata_url, file_name.trim_start_matches('/'))
    }

    /// Address of a stored target file, e.g. `dir/{hash}.file.txt`.
    pub fn target_address(&self, target_path: &str) -> String {
        format!("{}/{}", self.targets_url, target_path.trim_start_matches('/'))
    }

    /// Address of the target declared as `target_path`, hash-prefixed when
    /// the trusted root asks for it.
    pub fn target_file_address(&self, target_path: &str, target: &TargetDescriptor) -> String {
        match target.preferred_hash() {
            Some(hash) if self.hash_prefixed_targets => {
                self.target_address(&hash_prefixed_name(hash, target_path))
            }
            _ => self.target_address(target_path),
        }
    }

    pub async fn fetch(
        &mut self,
        address: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let parsed = FileAddress::parse(address);
        debug!(
            address = %parsed,
            kind = %self.kind(),
            version = ?parsed.version(),
            hash_prefix = ?parsed.hash_prefix(),
            "Fetching"
        );
        self.backend.fetch(parsed.as_str(), max_length, timeout).await
    }

    pub async fn fetch_metadata(
        &mut self,
        file_name: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let address = self.metadata_address(file_name);
        self.fetch(&address, max_length, timeout).await
    }

    /// Fetch a declared target; its declared length is the limit.
    pub async fn fetch_target(
        &mut self,
        target_path: &str,
        target: &TargetDescriptor,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let address = self.target_file_address(target_path, target);
        self.fetch(&address, target.length, timeout).await
    }

    /// Report where `address` would be read from.
    pub fn resolve(&self, address: &str) -> Result<BackendLocator, FetchError> {
        self.backend.locate(address)
    }
}

#[async_trait]
impl Fetcher for RepositorySession {
    async fn fetch(
        &mut self,
        address: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        RepositorySession::fetch(self, address, max_length, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_registry() {
        assert_eq!(
            RepositoryKind::detect("oci://ghcr.io/org/metadata", Some("oci://ghcr.io/org/targets"))
                .unwrap(),
            RepositoryKind::Registry
        );

        let err =
            RepositoryKind::detect("oci://ghcr.io/org/metadata", Some("/srv/targets")).unwrap_err();
        assert!(matches!(err, FetchError::Configuration(_)));

        let err =
            RepositoryKind::detect("/srv/metadata", Some("oci://ghcr.io/org/targets")).unwrap_err();
        assert!(matches!(err, FetchError::Configuration(_)));
    }

    #[test]
    fn test_detect_http_is_filesystem() {
        assert_eq!(
            RepositoryKind::detect("https://example.com/metadata", None).unwrap(),
            RepositoryKind::Filesystem
        );
    }

    #[test]
    fn test_sibling_targets() {
        assert_eq!(
            sibling_targets("https://example.com/repo/metadata").unwrap(),
            "https://example.com/repo/targets"
        );
        assert_eq!(
            sibling_targets("file:///srv/repo/metadata").unwrap(),
            "file:///srv/repo/targets"
        );
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(
            normalize_location("https://example.com/metadata/").unwrap(),
            "https://example.com/metadata"
        );
        assert_eq!(
            normalize_location("/srv/repo/metadata").unwrap(),
            "file:///srv/repo/metadata"
        );
    }
}
