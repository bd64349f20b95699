//! Role metadata records.
//!
//! Each role file is a [`Signed`] envelope around one of the typed records
//! below. Signatures are carried through untouched; nothing here verifies
//! them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// A signed metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signed: T,
    #[serde(default)]
    pub signatures: Vec<Signature>,
}

/// A signature over the `signed` portion of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    pub sig: String,
}

/// Common behaviour of the typed role records.
pub trait RoleMetadata: DeserializeOwned {
    /// Expected value of the `_type` field.
    const TYPE: &'static str;

    /// Value of the `_type` field as decoded.
    fn role_type(&self) -> &str;

    /// Version number of this document.
    fn version(&self) -> u64;

    /// Expiry time of this document.
    fn expires(&self) -> DateTime<Utc>;
}

impl<T: RoleMetadata> Signed<T> {
    /// Decode a signed document from bytes, checking its `_type`.
    ///
    /// `origin` is only used to label errors.
    pub fn from_slice(bytes: &[u8], origin: &Path) -> Result<Self, MetadataError> {
        let doc: Self = serde_json::from_slice(bytes).map_err(|source| MetadataError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        if doc.signed.role_type() != T::TYPE {
            return Err(MetadataError::WrongType {
                path: origin.to_path_buf(),
                expected: T::TYPE,
                actual: doc.signed.role_type().to_string(),
            });
        }

        Ok(doc)
    }

    /// Read and decode a signed document from disk.
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let bytes = fs::read(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&bytes, path)
    }
}

macro_rules! role_metadata {
    ($ty:ty, $name:literal) => {
        impl RoleMetadata for $ty {
            const TYPE: &'static str = $name;

            fn role_type(&self) -> &str {
                &self.role_type
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn expires(&self) -> DateTime<Utc> {
                self.expires
            }
        }
    };
}

/// A public key as listed in root or delegation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: BTreeMap<String, String>,
}

/// Key assignment and threshold for a top-level role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

/// Root role record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootMetadata {
    #[serde(rename = "_type")]
    pub role_type: String,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub consistent_snapshot: bool,
    #[serde(default)]
    pub keys: BTreeMap<String, Key>,
    #[serde(default)]
    pub roles: BTreeMap<String, RoleKeys>,
}

/// Version (and optionally length and hashes) of a referenced metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, String>>,
}

/// Timestamp role record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampMetadata {
    #[serde(rename = "_type")]
    pub role_type: String,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub meta: BTreeMap<String, MetaFile>,
}

/// Snapshot role record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(rename = "_type")]
    pub role_type: String,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub meta: BTreeMap<String, MetaFile>,
}

/// Length and digests of one target file.
///
/// Hash values are lowercase hex, keyed by algorithm name (`sha256`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

impl TargetDescriptor {
    /// Hash used to address the target in a hash-prefixed layout: `sha256`
    /// when declared, otherwise the first algorithm by name.
    pub fn preferred_hash(&self) -> Option<&str> {
        self.hashes
            .get("sha256")
            .or_else(|| self.hashes.values().next())
            .map(String::as_str)
    }
}

/// A role that a targets role delegates trust to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: String,
    #[serde(default)]
    pub keyids: Vec<String>,
    pub threshold: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_hash_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub terminating: bool,
}

/// Delegation declarations of a targets role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delegations {
    #[serde(default)]
    pub keys: BTreeMap<String, Key>,
    #[serde(default)]
    pub roles: Vec<DelegatedRole>,
}

/// Targets (or delegated targets) role record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsMetadata {
    #[serde(rename = "_type")]
    pub role_type: String,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,
}

impl TargetsMetadata {
    /// Names of the roles this role delegates to, in declaration order.
    pub fn delegated_role_names(&self) -> impl Iterator<Item = &str> {
        self.delegations
            .iter()
            .flat_map(|d| d.roles.iter())
            .map(|role| role.name.as_str())
    }
}

role_metadata!(RootMetadata, "root");
role_metadata!(TimestampMetadata, "timestamp");
role_metadata!(SnapshotMetadata, "snapshot");
role_metadata!(TargetsMetadata, "targets");
