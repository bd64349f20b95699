//! Registry repository references and locators.

use std::fmt;

use crate::address::OCI_SCHEME;
use crate::error::FetchError;

/// Tag used when a repository reference names none.
pub const LATEST_TAG: &str = "latest";

/// Registry assumed when a reference has no host component.
pub const DOCKER_HUB: &str = "docker.io";

/// API endpoint host for Docker Hub.
const DOCKER_HUB_API: &str = "registry-1.docker.io";

/// A configured registry repository with its default tag.
///
/// Parsed from `oci://[registry/]repository[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl RepositoryRef {
    /// Parse a repository reference, with or without the `oci://` prefix.
    ///
    /// Examples:
    /// - `alpine` -> (docker.io, library/alpine, latest)
    /// - `ghcr.io/org/metadata:v1` -> (ghcr.io, org/metadata, v1)
    /// - `localhost:5000/tuf/targets` -> (localhost:5000, tuf/targets, latest)
    pub fn parse(reference: &str) -> Result<Self, FetchError> {
        let stripped = reference.strip_prefix(OCI_SCHEME).unwrap_or(reference);
        let invalid = |reason: &str| {
            FetchError::configuration(format!("invalid repository reference '{reference}': {reason}"))
        };

        if stripped.is_empty() {
            return Err(invalid("empty reference"));
        }
        if stripped.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }
        if stripped.contains('@') {
            return Err(invalid("digest references are not supported here"));
        }

        // A ':' after the last '/' separates the tag; earlier ones are ports.
        let last_slash = stripped.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match stripped[last_slash..].rfind(':') {
            Some(i) => (&stripped[..last_slash + i], &stripped[last_slash + i + 1..]),
            None => (stripped, LATEST_TAG),
        };

        if !is_valid_tag(tag) {
            return Err(invalid("invalid tag"));
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            Some(_) => (DOCKER_HUB.to_string(), name.to_string()),
            None => (DOCKER_HUB.to_string(), format!("library/{name}")),
        };

        if !repository.split('/').all(is_valid_path_component) {
            return Err(invalid("invalid repository path"));
        }

        Ok(Self {
            registry,
            repository,
            tag: tag.to_string(),
        })
    }

    /// Host that serves the distribution API for this registry.
    pub fn api_host(&self) -> &str {
        api_host(&self.registry)
    }

    /// Locator for `tag` within this repository.
    pub fn tagged(&self, tag: impl Into<String>) -> RegistryLocator {
        RegistryLocator {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            reference: Reference::Tag(tag.into()),
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// Host that serves the distribution API for `registry`.
pub fn api_host(registry: &str) -> &str {
    if registry == DOCKER_HUB {
        DOCKER_HUB_API
    } else {
        registry
    }
}

/// Tag or digest half of a locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Tag(String),
    Digest(String),
}

/// A resolved `(repository, tag)` or `(repository, digest)` pair.
///
/// The display form (`registry/repo:tag` or `registry/repo@digest`) is also
/// the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLocator {
    pub registry: String,
    pub repository: String,
    pub reference: Reference,
}

impl RegistryLocator {
    /// Same repository, addressed by `digest`.
    pub fn with_digest(&self, digest: impl Into<String>) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            reference: Reference::Digest(digest.into()),
        }
    }

    /// The tag or digest string used in API paths.
    pub fn reference_str(&self) -> &str {
        match &self.reference {
            Reference::Tag(tag) => tag,
            Reference::Digest(digest) => digest,
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match &self.reference {
            Reference::Digest(digest) => Some(digest),
            Reference::Tag(_) => None,
        }
    }
}

impl fmt::Display for RegistryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Reference::Tag(tag) => write!(f, "{}/{}:{}", self.registry, self.repository, tag),
            Reference::Digest(digest) => {
                write!(f, "{}/{}@{}", self.registry, self.repository, digest)
            }
        }
    }
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    tag.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn is_valid_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) if first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("oci://registry.example.com/repo/metadata:v1", "registry.example.com", "repo/metadata", "v1")]
    #[case("oci://registry.example.com/repo/targets", "registry.example.com", "repo/targets", "latest")]
    #[case("oci://localhost:5000/tuf/metadata:dev", "localhost:5000", "tuf/metadata", "dev")]
    #[case("oci://127.0.0.1:5000/tuf/metadata", "127.0.0.1:5000", "tuf/metadata", "latest")]
    #[case("myuser/metadata:latest", "docker.io", "myuser/metadata", "latest")]
    #[case("alpine", "docker.io", "library/alpine", "latest")]
    fn test_parse_repository_ref(
        #[case] input: &str,
        #[case] registry: &str,
        #[case] repository: &str,
        #[case] tag: &str,
    ) {
        let parsed = RepositoryRef::parse(input).unwrap();
        assert_eq!(parsed.registry, registry);
        assert_eq!(parsed.repository, repository);
        assert_eq!(parsed.tag, tag);
    }

    #[rstest]
    #[case("oci://not valid")]
    #[case("oci://")]
    #[case("oci://registry.example.com/Repo/metadata")]
    #[case("oci://registry.example.com/repo//metadata")]
    #[case("oci://registry.example.com/repo/metadata:")]
    #[case("oci://registry.example.com/repo/metadata@sha256:abc")]
    fn test_parse_repository_ref_invalid(#[case] input: &str) {
        let err = RepositoryRef::parse(input).unwrap_err();
        assert!(matches!(err, FetchError::Configuration(_)));
    }

    #[test]
    fn test_locator_display_is_cache_key() {
        let repo = RepositoryRef::parse("oci://ghcr.io/org/targets").unwrap();
        let tagged = repo.tagged("file.txt");
        assert_eq!(tagged.to_string(), "ghcr.io/org/targets:file.txt");

        let pinned = tagged.with_digest("sha256:abc");
        assert_eq!(pinned.to_string(), "ghcr.io/org/targets@sha256:abc");
        assert_eq!(pinned.digest(), Some("sha256:abc"));
    }

    #[test]
    fn test_docker_hub_api_host() {
        let repo = RepositoryRef::parse("library/alpine").unwrap();
        assert_eq!(repo.api_host(), "registry-1.docker.io");

        let repo = RepositoryRef::parse("ghcr.io/org/metadata").unwrap();
        assert_eq!(repo.api_host(), "ghcr.io");
    }
}
