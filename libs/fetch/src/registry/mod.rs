//! Registry backend: TUF repositories stored as annotated OCI images.

mod auth;
mod cache;
mod client;
mod fetcher;
mod manifest;
mod reference;

pub use auth::{
    AuthEntry, Challenge, Credential, CredentialChain, CredentialProvider, DockerConfig,
    DockerConfigProvider, EcrHelperProvider, GoogleCloudProvider,
};
pub use cache::{CacheStats, ImageCache};
pub use client::{decompress_capped, verify_digest, OciClient, MAX_MANIFEST_LENGTH};
pub use fetcher::{RegistryFetcher, RegistryRequest, RepositoryRole};
pub use manifest::{
    Descriptor, Manifest, ManifestDescriptor, ManifestKind, DOCKER_MANIFEST_LIST,
    DOCKER_MANIFEST_V2, MANIFEST_ACCEPT, OCI_IMAGE_INDEX, OCI_IMAGE_MANIFEST,
    TUF_FILENAME_ANNOTATION, TUF_METADATA_MEDIA_TYPE, TUF_TARGET_MEDIA_TYPE,
};
pub use reference::{api_host, Reference, RegistryLocator, RepositoryRef, DOCKER_HUB, LATEST_TAG};
