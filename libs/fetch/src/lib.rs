//! File resolution for TUF repositories across storage backends.
//!
//! The trust engine asks for files by address (`fetch(address, max_length,
//! timeout)`) and this crate serves them from one of three backends:
//!
//! - [`FilesystemFetcher`]: canonical versioned layout on disk or over HTTP
//! - [`GitLayoutFetcher`]: unversioned working-tree layout with `root_history/`
//! - [`RegistryFetcher`]: metadata and targets stored as annotated OCI images
//!
//! A [`RepositorySession`] picks one backend when it is opened and never
//! switches. All backends report failures through [`FetchError`].
//!
//! ## Example
//!
//! ```no_run
//! use tufmux_fetch::{FetchConfig, RepositorySession};
//!
//! # async fn run() -> Result<(), tufmux_fetch::FetchError> {
//! let config = FetchConfig::from_env()?;
//! let mut session = RepositorySession::open("/srv/repo/metadata", None, None, &config)?;
//! let root = session
//!     .fetch_metadata("1.root.json", config.max_length, config.timeout)
//!     .await?;
//! # let _ = root;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod filesystem;
pub mod git_layout;
pub mod registry;
pub mod session;

pub use address::{AddressScheme, BackendLocator, FileAddress, OCI_SCHEME};
pub use config::{FetchConfig, DEFAULT_MAX_LENGTH, DEFAULT_TIMEOUT};
pub use error::{FetchError, FetchErrorKind, TransportError};
pub use fetcher::Fetcher;
pub use filesystem::FilesystemFetcher;
pub use git_layout::GitLayoutFetcher;
pub use registry::{RegistryFetcher, RegistryLocator, RepositoryRef};
pub use session::{Backend, RepositoryKind, RepositorySession};
