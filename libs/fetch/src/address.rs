//! Logical file addresses and the backend locators they resolve to.

use std::fmt;
use std::path::PathBuf;

use tufmux_metadata::{parse_versioned_name, split_hash_prefix, METADATA_EXTENSION};

use crate::registry::RegistryLocator;

/// URL scheme prefix for registry-hosted repositories.
pub const OCI_SCHEME: &str = "oci://";

/// How an address is spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressScheme {
    /// `file://` URL.
    File,
    /// `http://` or `https://` URL.
    Http,
    /// `oci://` registry address.
    Registry,
    /// Bare filesystem path.
    Path,
}

impl AddressScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressScheme::File => "file",
            AddressScheme::Http => "http",
            AddressScheme::Registry => "oci",
            AddressScheme::Path => "path",
        }
    }
}

impl fmt::Display for AddressScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file address as issued by the trust engine.
///
/// Immutable once parsed. The version and hash prefix are whatever the file
/// name embeds; they are informational and backends route on the raw string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAddress {
    raw: String,
    scheme: AddressScheme,
    file_name: String,
    version: Option<u64>,
    hash_prefix: Option<String>,
}

impl FileAddress {
    pub fn parse(address: &str) -> Self {
        let scheme = if address.starts_with(OCI_SCHEME) {
            AddressScheme::Registry
        } else if address.starts_with("file://") {
            AddressScheme::File
        } else if address.starts_with("http://") || address.starts_with("https://") {
            AddressScheme::Http
        } else {
            AddressScheme::Path
        };

        let (_, file_name) = split_file_name(address);

        let version = if file_name.ends_with(METADATA_EXTENSION) {
            parse_versioned_name(file_name).version
        } else {
            None
        };
        let hash_prefix = match version {
            Some(_) => None,
            None => split_hash_prefix(file_name).0.map(str::to_string),
        };

        Self {
            raw: address.to_string(),
            scheme,
            file_name: file_name.to_string(),
            version,
            hash_prefix,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> AddressScheme {
        self.scheme
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Version embedded in a `{N}.{role}.json` file name.
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Hash embedded in a `{hash}.{name}` target file name.
    pub fn hash_prefix(&self) -> Option<&str> {
        self.hash_prefix.as_deref()
    }
}

impl fmt::Display for FileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split an address into `(directory, file name)` at the last `/`.
pub fn split_file_name(address: &str) -> (&str, &str) {
    match address.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", address),
    }
}

/// Backend-specific target of a resolved address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendLocator {
    /// Local filesystem path.
    Path(PathBuf),
    /// Network URL.
    Url(String),
    /// Registry repository, tag, and (once known) digest.
    Registry(RegistryLocator),
}

impl fmt::Display for BackendLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendLocator::Path(path) => write!(f, "{}", path.display()),
            BackendLocator::Url(url) => f.write_str(url),
            BackendLocator::Registry(locator) => write!(f, "{locator}"),
        }
    }
}
