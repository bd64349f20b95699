//! # tufmux-layout
//!
//! Offline tools for TUF repository layouts.
//!
//! - [`convert_layout`] rewrites an unversioned working-tree layout (current
//!   `timestamp.json`, `snapshot.json` and role files plus `root_history/`)
//!   into the canonical versioned layout, materialising one hash-prefixed
//!   copy of every target per declared hash.
//! - [`DelegationTree`] loads the delegation graph of a local metadata
//!   directory for inspection.
//!
//! Both run synchronously and never verify signatures.

mod convert;
mod delegations;
mod error;

pub use convert::{convert_layout, ConversionReport, LayoutConverter, METADATA_DIR, TARGETS_DIR};
pub use delegations::{DelegationNode, DelegationTree, LoadedRole, RoleFiles};
pub use error::LayoutError;
