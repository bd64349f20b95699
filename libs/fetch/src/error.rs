//! Fetch error taxonomy.
//!
//! Every backend reports failures through [`FetchError`], whose four kinds are
//! the only distinctions callers are expected to branch on. Transport failures
//! keep their underlying cause in [`TransportError`] for diagnostics.

use std::io;

use thiserror::Error;

/// Errors returned by [`Fetcher::fetch`](crate::Fetcher::fetch).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The requested file is absent from the backend.
    #[error("not found: {location}")]
    NotFound { location: String },

    /// The declared or actual size exceeds the caller's maximum.
    #[error("length mismatch for {location}: {length} bytes exceeds maximum of {max_length} bytes")]
    LengthMismatch {
        location: String,
        length: u64,
        max_length: u64,
    },

    /// Network, registry, or authentication failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The request falls outside the configured repositories.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Flat classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NotFound,
    LengthMismatch,
    Transport,
    Configuration,
}

impl FetchError {
    pub fn not_found(location: impl Into<String>) -> Self {
        Self::NotFound {
            location: location.into(),
        }
    }

    pub fn length_mismatch(location: impl Into<String>, length: u64, max_length: u64) -> Self {
        Self::LengthMismatch {
            location: location.into(),
            length,
            max_length,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::NotFound { .. } => FetchErrorKind::NotFound,
            FetchError::LengthMismatch { .. } => FetchErrorKind::LengthMismatch,
            FetchError::Transport(_) => FetchErrorKind::Transport,
            FetchError::Configuration(_) => FetchErrorKind::Configuration,
        }
    }

    /// Returns true if the file does not exist in the backend.
    pub fn is_not_found(&self) -> bool {
        self.kind() == FetchErrorKind::NotFound
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(TransportError::from(err))
    }
}

impl From<io::Error> for FetchError {
    fn from(err: io::Error) -> Self {
        FetchError::Transport(TransportError::from(err))
    }
}

/// Underlying cause of a transport failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("authentication failed for {registry}: {reason}")]
    Auth { registry: String, reason: String },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
