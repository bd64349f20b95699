//! Role names and the filename conventions built on them.

use std::fmt;
use std::str::FromStr;

/// Name of the implicit root of the delegation graph.
pub const TARGETS_ROLE: &str = "targets";

/// Directory holding historical root versions in an unversioned layout.
pub const ROOT_HISTORY_DIR: &str = "root_history";

/// Metadata file extension.
pub const METADATA_EXTENSION: &str = ".json";

/// Minimum number of hex digits recognised as a hash prefix.
const MIN_HASH_PREFIX_LEN: usize = 32;

/// The four top-level roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopLevelRole {
    Root,
    Timestamp,
    Snapshot,
    Targets,
}

impl TopLevelRole {
    pub const ALL: [TopLevelRole; 4] = [
        TopLevelRole::Root,
        TopLevelRole::Timestamp,
        TopLevelRole::Snapshot,
        TopLevelRole::Targets,
    ];

    /// Canonical role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopLevelRole::Root => "root",
            TopLevelRole::Timestamp => "timestamp",
            TopLevelRole::Snapshot => "snapshot",
            TopLevelRole::Targets => TARGETS_ROLE,
        }
    }

    /// Unversioned metadata filename, e.g. `snapshot.json`.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.as_str(), METADATA_EXTENSION)
    }

    /// Versioned metadata filename, e.g. `4.snapshot.json`.
    pub fn versioned_file_name(&self, version: u64) -> String {
        versioned_file_name(version, self.as_str())
    }
}

impl fmt::Display for TopLevelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopLevelRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TopLevelRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or(())
    }
}

/// Returns true if `role` names one of the four top-level roles.
pub fn is_top_level_role(role: &str) -> bool {
    role.parse::<TopLevelRole>().is_ok()
}

/// A metadata filename split into its optional version and role name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedName {
    pub version: Option<u64>,
    pub role: String,
}

impl VersionedName {
    /// Returns the top-level role this name refers to, if any.
    pub fn top_level(&self) -> Option<TopLevelRole> {
        self.role.parse().ok()
    }
}

/// Split a metadata filename into `(version, role)`.
///
/// `3.root.json` yields version 3 and role `root`; `delegated.json` yields no
/// version and role `delegated`. Only a leading all-digit segment counts as a
/// version, so role names that themselves contain dots survive intact.
pub fn parse_versioned_name(file_name: &str) -> VersionedName {
    let stem = file_name
        .strip_suffix(METADATA_EXTENSION)
        .unwrap_or(file_name);

    if let Some((prefix, rest)) = stem.split_once('.') {
        if !prefix.is_empty() && !rest.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(version) = prefix.parse() {
                return VersionedName {
                    version: Some(version),
                    role: rest.to_string(),
                };
            }
        }
    }

    VersionedName {
        version: None,
        role: stem.to_string(),
    }
}

/// Build a versioned metadata filename: `{version}.{role}.json`.
pub fn versioned_file_name(version: u64, role: &str) -> String {
    format!("{version}.{role}{METADATA_EXTENSION}")
}

/// Build the hash-prefixed name of a target: `{dir}/{hash}.{basename}`.
///
/// The directory part of `target_path` is kept; for a flat target the result
/// is exactly `{hash}.{basename}`.
pub fn hash_prefixed_name(hash_hex: &str, target_path: &str) -> String {
    match target_path.rsplit_once('/') {
        Some((dir, base)) => format!("{dir}/{hash_hex}.{base}"),
        None => format!("{hash_hex}.{target_path}"),
    }
}

/// Split a leading hash prefix off a target basename.
///
/// Returns `(Some(hash), rest)` when the name starts with at least 32 hex
/// digits followed by a dot.
pub fn split_hash_prefix(file_name: &str) -> (Option<&str>, &str) {
    if let Some((prefix, rest)) = file_name.split_once('.') {
        if prefix.len() >= MIN_HASH_PREFIX_LEN
            && !rest.is_empty()
            && prefix.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return (Some(prefix), rest);
        }
    }
    (None, file_name)
}
