//! Layout conversion errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tufmux_metadata::MetadataError;

/// Errors from converting or inspecting a layout.
///
/// Conversion stops at the first error. Files written before it stay on
/// disk and the output directory must be discarded.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// An expected input file or directory does not exist.
    #[error("missing input: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A role or target name would escape its directory.
    #[error("unsafe {kind} name: {name}")]
    UnsafeName { kind: &'static str, name: String },

    #[error(transparent)]
    Metadata(MetadataError),
}

impl LayoutError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            LayoutError::MissingInput { path }
        } else {
            LayoutError::Io { path, source }
        }
    }

    /// The path the error refers to, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            LayoutError::MissingInput { path } | LayoutError::Io { path, .. } => Some(path),
            LayoutError::Metadata(e) => Some(e.path()),
            LayoutError::UnsafeName { .. } => None,
        }
    }
}

impl From<MetadataError> for LayoutError {
    fn from(err: MetadataError) -> Self {
        if err.is_missing() {
            LayoutError::MissingInput {
                path: err.path().clone(),
            }
        } else {
            LayoutError::Metadata(err)
        }
    }
}
