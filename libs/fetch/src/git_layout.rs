//! Git-layout backend.
//!
//! A working-tree checkout keeps only the current copy of the frequently
//! rotating roles plus a `root_history/` directory, while the trust engine
//! always asks for versioned names. This backend rewrites the file name and
//! hands the request to [`FilesystemFetcher`]. It holds no state of its own.
//!
//! | Requested            | Served                    |
//! |----------------------|---------------------------|
//! | `1.root.json`        | `1.root.json`             |
//! | other `N.root.json`  | `root_history/N.root.json`|
//! | `N.snapshot.json`    | `snapshot.json`           |
//! | `N.timestamp.json`   | `timestamp.json`          |
//! | `N.targets.json`     | `targets.json`            |
//! | anything else        | unchanged                 |

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use tufmux_metadata::{parse_versioned_name, TopLevelRole, METADATA_EXTENSION, ROOT_HISTORY_DIR};

use crate::address::{split_file_name, BackendLocator};
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::filesystem::FilesystemFetcher;

/// Serves versioned requests from an unversioned working-tree layout.
#[derive(Debug, Clone)]
pub struct GitLayoutFetcher {
    inner: FilesystemFetcher,
}

impl GitLayoutFetcher {
    pub fn new(inner: FilesystemFetcher) -> Self {
        Self { inner }
    }

    /// Resolve an address to the path or URL it will be read from.
    pub fn locate(&self, address: &str) -> Result<BackendLocator, FetchError> {
        self.inner.locate(&map_address(address))
    }
}

#[async_trait]
impl Fetcher for GitLayoutFetcher {
    async fn fetch(
        &mut self,
        address: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let mapped = map_address(address);
        if mapped != address {
            debug!(requested = %address, served = %mapped, "Rewrote git-layout address");
        }
        self.inner.fetch(&mapped, max_length, timeout).await
    }
}

/// Rewrite the file-name component of an address; the directory is kept.
pub fn map_address(address: &str) -> String {
    let (dir, file_name) = split_file_name(address);
    match map_file_name(file_name) {
        Some(mapped) if dir.is_empty() => mapped,
        Some(mapped) => format!("{dir}/{mapped}"),
        None => address.to_string(),
    }
}

/// Rewrite a requested file name, or `None` if it passes through unchanged.
pub fn map_file_name(file_name: &str) -> Option<String> {
    if !file_name.ends_with(METADATA_EXTENSION) {
        return None;
    }

    let parsed = parse_versioned_name(file_name);
    parsed.version?;

    match parsed.top_level()? {
        // Only the literal `1.` prefix is served in place; `01.root.json` is not.
        TopLevelRole::Root if file_name.starts_with("1.") => None,
        TopLevelRole::Root => Some(format!("{ROOT_HISTORY_DIR}/{file_name}")),
        role => Some(role.file_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("3.root.json", "root_history/3.root.json")]
    #[case("2.root.json", "root_history/2.root.json")]
    #[case("1.root.json", "1.root.json")]
    #[case("0.root.json", "root_history/0.root.json")]
    #[case("01.root.json", "root_history/01.root.json")]
    #[case("7.snapshot.json", "snapshot.json")]
    #[case("1.snapshot.json", "snapshot.json")]
    #[case("12.timestamp.json", "timestamp.json")]
    #[case("4.targets.json", "targets.json")]
    #[case("timestamp.json", "timestamp.json")]
    #[case("delegated.json", "delegated.json")]
    #[case("3.delegated.json", "3.delegated.json")]
    #[case("file.txt", "file.txt")]
    fn test_map_address_bare(#[case] requested: &str, #[case] served: &str) {
        assert_eq!(map_address(requested), served);
    }

    #[test]
    fn test_map_address_keeps_directory() {
        assert_eq!(
            map_address("file:///repo/metadata/5.root.json"),
            "file:///repo/metadata/root_history/5.root.json"
        );
        assert_eq!(
            map_address("https://example.com/repo/metadata/9.snapshot.json"),
            "https://example.com/repo/metadata/snapshot.json"
        );
        assert_eq!(
            map_address("/repo/metadata/1.root.json"),
            "/repo/metadata/1.root.json"
        );
        assert_eq!(
            map_address("/repo/targets/dir/file.txt"),
            "/repo/targets/dir/file.txt"
        );
    }
}
