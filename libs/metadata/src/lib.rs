//! # tufmux-metadata
//!
//! Role names, filename conventions, and role metadata records shared by the
//! fetch backends and the layout converter.
//!
//! ## Filename Conventions
//!
//! - Versioned metadata: `{version}.{role}.json` (e.g. `3.root.json`)
//! - Unversioned metadata: `{role}.json` (e.g. `snapshot.json`)
//! - Hash-prefixed targets: `{hash-hex}.{basename}`
//!
//! The timestamp role is never versioned in a canonical layout.
//!
//! Records are decoded once into explicit types rather than read field by
//! field. Unknown fields (including tooling-specific `x-` extensions) are
//! ignored.

mod error;
mod role;
mod types;

pub use error::MetadataError;
pub use role::*;
pub use types::*;
