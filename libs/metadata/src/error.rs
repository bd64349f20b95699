//! Error types for loading role metadata.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading or decoding role metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The metadata file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The metadata file is not valid JSON for the expected record.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The `_type` field names a different role type.
    #[error("wrong metadata type in {}: expected '{expected}', got '{actual}'", path.display())]
    WrongType {
        path: PathBuf,
        expected: &'static str,
        actual: String,
    },
}

impl MetadataError {
    /// Returns true if the underlying file does not exist.
    pub fn is_missing(&self) -> bool {
        matches!(self, MetadataError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// The path of the file that failed to load.
    pub fn path(&self) -> &PathBuf {
        match self {
            MetadataError::Io { path, .. }
            | MetadataError::Parse { path, .. }
            | MetadataError::WrongType { path, .. } => path,
        }
    }
}
