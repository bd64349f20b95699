//! Registry backend.
//!
//! Metadata and targets live in two registry repositories. In the metadata
//! repository the four top-level roles share the configured tag and every
//! delegated role has a tag of its own name. In the targets repository a flat
//! target is tagged with its file name; a target under a subdirectory is
//! reached through an index manifest tagged with the subdirectory name.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use tufmux_metadata::{is_top_level_role, parse_versioned_name};

use super::auth::CredentialChain;
use super::cache::{CacheStats, ImageCache};
use super::client::{decompress_capped, OciClient};
use super::manifest::{Manifest, ManifestDescriptor, ManifestKind};
use super::reference::{RegistryLocator, RepositoryRef};
use crate::address::{split_file_name, BackendLocator, OCI_SCHEME};
use crate::config::FetchConfig;
use crate::error::{FetchError, TransportError};
use crate::fetcher::Fetcher;

/// Index manifests nested deeper than this are rejected.
const MAX_MANIFEST_DEPTH: usize = 8;

/// Which configured repository a request falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryRole {
    Metadata,
    Targets,
}

/// A request mapped onto a registry manifest and the file name to find in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRequest {
    pub repository: RepositoryRole,
    pub locator: RegistryLocator,
    pub file_name: String,
}

/// Fetches TUF files stored as annotated image layers.
#[derive(Debug)]
pub struct RegistryFetcher {
    metadata_url: String,
    metadata: RepositoryRef,
    targets_url: String,
    targets: RepositoryRef,
    manifests: ImageCache,
    layers: ImageCache,
    client: OciClient,
}

impl RegistryFetcher {
    /// Create a fetcher for `oci://` metadata and targets repositories.
    pub fn new(
        metadata_url: &str,
        targets_url: &str,
        config: &FetchConfig,
    ) -> Result<Self, FetchError> {
        Self::with_client(metadata_url, targets_url, OciClient::new(config)?)
    }

    /// Create a fetcher with an explicit credential chain.
    pub fn with_credentials(
        metadata_url: &str,
        targets_url: &str,
        config: &FetchConfig,
        credentials: CredentialChain,
    ) -> Result<Self, FetchError> {
        let client = OciClient::with_credentials(config, credentials)?;
        Self::with_client(metadata_url, targets_url, client)
    }

    fn with_client(
        metadata_url: &str,
        targets_url: &str,
        client: OciClient,
    ) -> Result<Self, FetchError> {
        let metadata_url = repository_url(metadata_url)?;
        let targets_url = repository_url(targets_url)?;

        Ok(Self {
            metadata: RepositoryRef::parse(&metadata_url)?,
            targets: RepositoryRef::parse(&targets_url)?,
            metadata_url,
            targets_url,
            manifests: ImageCache::new(),
            layers: ImageCache::new(),
            client,
        })
    }

    pub fn metadata_repository(&self) -> &RepositoryRef {
        &self.metadata
    }

    pub fn targets_repository(&self) -> &RepositoryRef {
        &self.targets
    }

    /// Map a request onto `(locator, file name)`.
    ///
    /// Targets are matched first, so a targets URL nested under the metadata
    /// URL still routes correctly.
    pub fn parse_request(&self, address: &str) -> Result<RegistryRequest, FetchError> {
        if let Some(path) = strip_repository(address, &self.targets_url) {
            let tag = match path.split_once('/') {
                Some((dir, _)) => dir,
                None => path,
            };
            return Ok(RegistryRequest {
                repository: RepositoryRole::Targets,
                locator: self.targets.tagged(tag),
                file_name: path.to_string(),
            });
        }

        if let Some(path) = strip_repository(address, &self.metadata_url) {
            let (_, file_name) = split_file_name(path);
            let role = parse_versioned_name(file_name).role;
            let tag = if is_top_level_role(&role) {
                self.metadata.tag.clone()
            } else {
                role
            };
            return Ok(RegistryRequest {
                repository: RepositoryRole::Metadata,
                locator: self.metadata.tagged(tag),
                file_name: file_name.to_string(),
            });
        }

        Err(FetchError::configuration(format!(
            "{address} is outside both {} and {}",
            self.metadata_url, self.targets_url
        )))
    }

    /// Resolve an address to the manifest it will be looked up in.
    pub fn locate(&self, address: &str) -> Result<BackendLocator, FetchError> {
        Ok(BackendLocator::Registry(self.parse_request(address)?.locator))
    }

    /// Statistics for the manifest cache.
    pub fn manifest_cache_stats(&self) -> CacheStats {
        self.manifests.stats()
    }

    /// Statistics for the layer cache.
    pub fn layer_cache_stats(&self) -> CacheStats {
        self.layers.stats()
    }

    async fn fetch_request(
        &mut self,
        address: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let request = self.parse_request(address)?;
        debug!(
            address = %address,
            locator = %request.locator,
            file_name = %request.file_name,
            "Resolved registry request"
        );

        let mut locator = request.locator;
        let mut name = request.file_name;

        for _ in 0..MAX_MANIFEST_DEPTH {
            let manifest = self.manifest(&locator, timeout).await?;
            let descriptor = manifest.find(&name)?.ok_or_else(|| {
                debug!(file_name = %name, manifest = %locator, "File not in manifest");
                FetchError::not_found(address)
            })?;

            match descriptor.parent {
                ManifestKind::Index => {
                    locator = locator.with_digest(&descriptor.digest);
                    name = split_file_name(&name).1.to_string();
                }
                ManifestKind::Image => {
                    let layer = locator.with_digest(&descriptor.digest);
                    return self.layer(&layer, &descriptor, max_length, timeout).await;
                }
            }
        }

        Err(TransportError::InvalidManifest(format!(
            "index manifests for {address} nest deeper than {MAX_MANIFEST_DEPTH} levels"
        ))
        .into())
    }

    async fn manifest(
        &mut self,
        locator: &RegistryLocator,
        timeout: Duration,
    ) -> Result<Manifest, FetchError> {
        let key = locator.to_string();
        let data = match self.manifests.get(&key) {
            Some(data) => data,
            None => {
                let data = self.client.pull_manifest(locator, timeout).await?;
                self.manifests.insert(key, data)
            }
        };
        Ok(Manifest::from_slice(&data)?)
    }

    async fn layer(
        &mut self,
        locator: &RegistryLocator,
        descriptor: &ManifestDescriptor,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let key = locator.to_string();

        if descriptor.size > max_length {
            return Err(FetchError::length_mismatch(key, descriptor.size, max_length));
        }

        if let Some(data) = self.layers.get(&key) {
            let length = data.len() as u64;
            if length > max_length {
                return Err(FetchError::length_mismatch(key, length, max_length));
            }
            return Ok(data);
        }

        let raw = self.client.pull_blob(locator, max_length, timeout).await?;
        let data = if descriptor.is_gzip() {
            decompress_capped(&raw, &key, max_length)?
        } else {
            raw
        };

        Ok(self.layers.insert(key, data))
    }
}

#[async_trait]
impl Fetcher for RegistryFetcher {
    async fn fetch(
        &mut self,
        address: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        tokio::time::timeout(timeout, self.fetch_request(address, max_length, timeout))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }
}

fn repository_url(url: &str) -> Result<String, FetchError> {
    if !url.starts_with(OCI_SCHEME) {
        return Err(FetchError::configuration(format!(
            "registry repository must be an {OCI_SCHEME} URL: {url}"
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// The path below `prefix`, if `address` is `{prefix}/{path}`.
fn strip_repository<'a>(address: &'a str, prefix: &str) -> Option<&'a str> {
    address
        .strip_prefix(prefix)?
        .strip_prefix('/')
        .filter(|path| !path.is_empty())
}
