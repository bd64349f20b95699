//! Image and index manifests carrying TUF files.
//!
//! Every descriptor that points at a TUF file records the original logical
//! file name in the [`TUF_FILENAME_ANNOTATION`] annotation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Annotation key recording a blob's logical file name.
pub const TUF_FILENAME_ANNOTATION: &str = "tuf.io/filename";

/// Layer media type for metadata files.
pub const TUF_METADATA_MEDIA_TYPE: &str = "application/vnd.tuf.metadata+json";

/// Layer media type for target files.
pub const TUF_TARGET_MEDIA_TYPE: &str = "application/vnd.tuf.target";

pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// `Accept` header for manifest requests.
pub const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json";

/// Whether a manifest lists blobs directly or groups other manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Single-image manifest (`layers`).
    Image,
    /// Index manifest (`manifests`).
    Index,
}

/// An image or index manifest, decoded leniently.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version.
    pub schema_version: u32,
    /// Media type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Config descriptor (image manifests only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,
    /// Layer descriptors (image manifests).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<Descriptor>,
    /// Child manifest descriptors (index manifests).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<Descriptor>,
}

/// Content descriptor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: String,
    /// Digest of the content.
    pub digest: String,
    /// Size in bytes.
    pub size: u64,
    /// Descriptor annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    /// Logical file name recorded on this descriptor.
    pub fn file_name(&self) -> Option<&str> {
        self.annotations
            .get(TUF_FILENAME_ANNOTATION)
            .map(String::as_str)
    }

    /// Returns true if the blob is gzip-compressed.
    pub fn is_gzip(&self) -> bool {
        is_gzip_media_type(&self.media_type)
    }
}

/// A descriptor matched by file name, with the kind of manifest it came from.
#[derive(Debug, Clone)]
pub struct ManifestDescriptor {
    pub file_name: String,
    pub digest: String,
    pub size: u64,
    pub media_type: String,
    pub parent: ManifestKind,
}

impl ManifestDescriptor {
    pub fn is_gzip(&self) -> bool {
        is_gzip_media_type(&self.media_type)
    }
}

fn is_gzip_media_type(media_type: &str) -> bool {
    media_type.ends_with("+gzip") || media_type.ends_with(".gzip")
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TransportError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Classify by media type, falling back to which descriptor list is set.
    pub fn kind(&self) -> Result<ManifestKind, TransportError> {
        match self.media_type.as_deref() {
            Some(OCI_IMAGE_INDEX | DOCKER_MANIFEST_LIST) => Ok(ManifestKind::Index),
            Some(OCI_IMAGE_MANIFEST | DOCKER_MANIFEST_V2) => Ok(ManifestKind::Image),
            Some(other) => Err(TransportError::InvalidManifest(format!(
                "unsupported manifest media type: {other}"
            ))),
            None if !self.manifests.is_empty() => Ok(ManifestKind::Index),
            None => Ok(ManifestKind::Image),
        }
    }

    /// Candidate descriptors: layers for an image, child manifests for an index.
    pub fn candidates(&self) -> Result<(ManifestKind, &[Descriptor]), TransportError> {
        let kind = self.kind()?;
        let descriptors = match kind {
            ManifestKind::Image => &self.layers,
            ManifestKind::Index => &self.manifests,
        };
        Ok((kind, descriptors))
    }

    /// Find the first descriptor whose file-name annotation equals `name`.
    pub fn find(&self, name: &str) -> Result<Option<ManifestDescriptor>, TransportError> {
        let (kind, descriptors) = self.candidates()?;

        Ok(descriptors
            .iter()
            .find(|d| d.file_name() == Some(name))
            .map(|d| ManifestDescriptor {
                file_name: name.to_string(),
                digest: d.digest.clone(),
                size: d.size,
                media_type: d.media_type.clone(),
                parent: kind,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &str, digest: &str, size: u64) -> Descriptor {
        Descriptor {
            media_type: TUF_METADATA_MEDIA_TYPE.to_string(),
            digest: digest.to_string(),
            size,
            annotations: BTreeMap::from([(TUF_FILENAME_ANNOTATION.to_string(), name.to_string())]),
        }
    }

    #[test]
    fn test_find_in_image_manifest() {
        let manifest = Manifest {
            schema_version: 2,
            media_type: Some(OCI_IMAGE_MANIFEST.to_string()),
            config: None,
            layers: vec![
                layer("1.root.json", "sha256:root", 100),
                layer("timestamp.json", "sha256:ts", 50),
            ],
            manifests: vec![],
        };

        let found = manifest.find("timestamp.json").unwrap().unwrap();
        assert_eq!(found.digest, "sha256:ts");
        assert_eq!(found.size, 50);
        assert_eq!(found.parent, ManifestKind::Image);

        assert!(manifest.find("2.root.json").unwrap().is_none());
    }

    #[test]
    fn test_index_manifest_kind() {
        let json = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_IMAGE_INDEX,
            "manifests": [{
                "mediaType": OCI_IMAGE_MANIFEST,
                "digest": "sha256:child",
                "size": 300,
                "annotations": { TUF_FILENAME_ANNOTATION: "subdir/file.txt" }
            }]
        });
        let manifest = Manifest::from_slice(&serde_json::to_vec(&json).unwrap()).unwrap();

        let found = manifest.find("subdir/file.txt").unwrap().unwrap();
        assert_eq!(found.parent, ManifestKind::Index);
        assert_eq!(found.digest, "sha256:child");
    }

    #[test]
    fn test_kind_without_media_type() {
        let json = br#"{"schemaVersion": 2, "manifests": [{"mediaType": "x", "digest": "sha256:a", "size": 1}]}"#;
        let manifest = Manifest::from_slice(json).unwrap();
        assert_eq!(manifest.kind().unwrap(), ManifestKind::Index);

        let json = br#"{"schemaVersion": 2, "layers": []}"#;
        let manifest = Manifest::from_slice(json).unwrap();
        assert_eq!(manifest.kind().unwrap(), ManifestKind::Image);
    }

    #[test]
    fn test_unknown_media_type_rejected() {
        let json = br#"{"schemaVersion": 1, "mediaType": "application/vnd.docker.distribution.manifest.v1+json"}"#;
        let manifest = Manifest::from_slice(json).unwrap();
        assert!(matches!(
            manifest.kind(),
            Err(TransportError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_gzip_detection() {
        let mut d = layer("file.txt", "sha256:a", 1);
        assert!(!d.is_gzip());
        d.media_type = "application/vnd.oci.image.layer.v1.tar+gzip".to_string();
        assert!(d.is_gzip());
    }
}
