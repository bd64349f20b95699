//! OCI distribution client for pulling TUF manifests and blobs.
//!
//! Implements the read side of the OCI Distribution Specification plus the
//! token handshake most registries require for anonymous or authenticated
//! pulls.
//!
//! Reference: https://github.com/opencontainers/distribution-spec

use std::collections::HashMap;
use std::io::Read;
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::header::{ACCEPT, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::auth::{Challenge, Credential, CredentialChain};
use super::manifest::MANIFEST_ACCEPT;
use super::reference::{api_host, RegistryLocator};
use crate::config::FetchConfig;
use crate::error::{FetchError, TransportError};
use crate::filesystem::{read_capped, transport_error};

/// Largest manifest accepted from a registry.
pub const MAX_MANIFEST_LENGTH: u64 = 4 * 1024 * 1024; // 4 MiB

/// OAuth2 client id sent with refresh-token exchanges.
const OAUTH_CLIENT_ID: &str = "tufmux";

#[derive(Clone)]
enum Authorization {
    Bearer(String),
    Basic { username: String, password: String },
}

impl Authorization {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Authorization::Bearer(token) => request.bearer_auth(token),
            Authorization::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// OCI Distribution client.
///
/// Credentials are resolved once per registry host and authorizations are
/// memoised per `registry/repository` for the client's lifetime.
pub struct OciClient {
    config: FetchConfig,
    client: Client,
    credentials: CredentialChain,
    resolved: HashMap<String, Option<Credential>>,
    authorizations: HashMap<String, Authorization>,
}

impl OciClient {
    /// Create a client using the default credential chain.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::with_credentials(config, CredentialChain::from_config(config))
    }

    pub fn with_credentials(
        config: &FetchConfig,
        credentials: CredentialChain,
    ) -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;

        Ok(Self {
            config: config.clone(),
            client,
            credentials,
            resolved: HashMap::new(),
            authorizations: HashMap::new(),
        })
    }

    /// Base URL of the distribution API for `registry`.
    pub fn base_url(&self, registry: &str) -> String {
        let scheme = if self.config.is_insecure(registry) {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{}", api_host(registry))
    }

    /// Pull a manifest by tag or digest. Digest pulls are verified.
    pub async fn pull_manifest(
        &mut self,
        locator: &RegistryLocator,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.base_url(&locator.registry),
            locator.repository,
            locator.reference_str()
        );

        debug!(url = %url, "Pulling manifest");

        let response = self.get(locator, &url, Some(MANIFEST_ACCEPT), timeout).await?;
        check_status(&response, locator, &url)?;

        let body = read_capped(response, &url, MAX_MANIFEST_LENGTH, timeout)
            .await
            .map_err(|e| match e {
                FetchError::LengthMismatch { .. } => FetchError::from(
                    TransportError::InvalidManifest(format!(
                        "manifest {locator} exceeds {MAX_MANIFEST_LENGTH} bytes"
                    )),
                ),
                other => other,
            })?;

        if let Some(digest) = locator.digest() {
            verify_digest(&body, digest)?;
        }

        info!(locator = %locator, size = body.len(), "Manifest pulled");
        Ok(body)
    }

    /// Pull a blob by digest, verifying it and reading at most
    /// `max_length + 1` bytes.
    pub async fn pull_blob(
        &mut self,
        locator: &RegistryLocator,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let digest = locator.digest().ok_or_else(|| {
            TransportError::InvalidAddress(format!("blob locator {locator} has no digest"))
        })?;

        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.base_url(&locator.registry),
            locator.repository,
            digest
        );

        debug!(url = %url, "Pulling blob");

        let response = self.get(locator, &url, None, timeout).await?;
        check_status(&response, locator, &url)?;

        let location = locator.to_string();
        if let Some(size) = response.content_length() {
            if size > max_length {
                return Err(FetchError::length_mismatch(location, size, max_length));
            }
        }

        let body = read_capped(response, &location, max_length, timeout).await?;
        verify_digest(&body, digest)?;

        info!(digest = %digest, size = body.len(), "Blob pulled");
        Ok(body)
    }

    /// Issue a GET, answering at most one authentication challenge.
    async fn get(
        &mut self,
        locator: &RegistryLocator,
        url: &str,
        accept: Option<&'static str>,
        timeout: Duration,
    ) -> Result<Response, FetchError> {
        let scope_key = format!("{}/{}", locator.registry, locator.repository);
        let mut challenged = false;

        loop {
            let mut request = self.client.get(url).timeout(timeout);
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            if let Some(authorization) = self.authorizations.get(&scope_key) {
                request = authorization.apply(request);
            }

            let response = request
                .send()
                .await
                .map_err(|e| transport_error(e, timeout))?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if challenged {
                return Err(auth_error(&locator.registry, "credentials rejected"));
            }

            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(Challenge::parse)
                .ok_or_else(|| {
                    auth_error(&locator.registry, "401 without a supported challenge")
                })?;

            debug!(registry = %locator.registry, challenge = ?challenge, "Answering auth challenge");

            let authorization = self.authorize(locator, challenge, timeout).await?;
            self.authorizations.insert(scope_key.clone(), authorization);
            challenged = true;
        }
    }

    async fn authorize(
        &mut self,
        locator: &RegistryLocator,
        challenge: Challenge,
        timeout: Duration,
    ) -> Result<Authorization, FetchError> {
        let credential = self.credential(&locator.registry).await;

        match challenge {
            Challenge::Basic => match credential {
                Some(Credential::Basic { username, password }) => {
                    Ok(Authorization::Basic { username, password })
                }
                _ => Err(auth_error(
                    &locator.registry,
                    "registry requires basic credentials",
                )),
            },
            Challenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let scope =
                    scope.unwrap_or_else(|| format!("repository:{}:pull", locator.repository));
                let token = self
                    .fetch_token(
                        &locator.registry,
                        &realm,
                        service.as_deref(),
                        &scope,
                        credential.as_ref(),
                        timeout,
                    )
                    .await?;
                Ok(Authorization::Bearer(token))
            }
        }
    }

    async fn fetch_token(
        &self,
        registry: &str,
        realm: &str,
        service: Option<&str>,
        scope: &str,
        credential: Option<&Credential>,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let request = match credential {
            Some(Credential::IdentityToken(refresh_token)) => {
                let mut form = vec![
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                    ("client_id", OAUTH_CLIENT_ID),
                    ("scope", scope),
                ];
                if let Some(service) = service {
                    form.push(("service", service));
                }
                self.client.post(realm).form(&form)
            }
            other => {
                let mut query = vec![("scope", scope)];
                if let Some(service) = service {
                    query.push(("service", service));
                }
                let request = self.client.get(realm).query(&query);
                match other {
                    Some(Credential::Basic { username, password }) => {
                        request.basic_auth(username, Some(password))
                    }
                    _ => request,
                }
            }
        };

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        if !response.status().is_success() {
            return Err(auth_error(
                registry,
                &format!("token endpoint returned {}", response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        let token: TokenResponse = serde_json::from_slice(&body).map_err(TransportError::from)?;

        token
            .token
            .or(token.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| auth_error(registry, "token response carried no token"))
    }

    /// Resolve credentials for `registry` once; helpers may spawn processes.
    async fn credential(&mut self, registry: &str) -> Option<Credential> {
        if let Some(credential) = self.resolved.get(registry) {
            return credential.clone();
        }

        let chain = self.credentials.clone();
        let host = registry.to_string();
        let credential = match tokio::task::spawn_blocking(move || chain.resolve(&host)).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(registry = %registry, error = %e, "Credential resolution failed");
                None
            }
        };

        self.resolved.insert(registry.to_string(), credential.clone());
        credential
    }
}

impl std::fmt::Debug for OciClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciClient")
            .field("credentials", &self.credentials)
            .field("authorized", &self.authorizations.len())
            .finish()
    }
}

fn check_status(response: &Response, locator: &RegistryLocator, url: &str) -> Result<(), FetchError> {
    match response.status() {
        StatusCode::OK => Ok(()),
        StatusCode::NOT_FOUND => Err(FetchError::not_found(locator.to_string())),
        status => Err(TransportError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        }
        .into()),
    }
}

fn auth_error(registry: &str, reason: &str) -> FetchError {
    TransportError::Auth {
        registry: registry.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Check `data` against a `sha256:<hex>` digest.
pub fn verify_digest(data: &[u8], expected: &str) -> Result<(), TransportError> {
    let hex_digest = match expected.split_once(':') {
        Some(("sha256", hex_digest)) => hex_digest,
        _ => {
            return Err(TransportError::InvalidManifest(format!(
                "unsupported digest: {expected}"
            )))
        }
    };

    let computed = hex::encode(Sha256::digest(data));
    if !computed.eq_ignore_ascii_case(hex_digest) {
        return Err(TransportError::DigestMismatch {
            expected: expected.to_string(),
            actual: format!("sha256:{computed}"),
        });
    }

    Ok(())
}

/// Gunzip `data`, failing once the output passes `max_length` bytes.
pub fn decompress_capped(data: &[u8], location: &str, max_length: u64) -> Result<Bytes, FetchError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .take(max_length.saturating_add(1))
        .read_to_end(&mut out)?;

    let length = out.len() as u64;
    if length > max_length {
        return Err(FetchError::length_mismatch(location, length, max_length));
    }

    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_verify_digest() {
        let data = b"hello";
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(data)));

        assert!(verify_digest(data, &digest).is_ok());
        assert!(matches!(
            verify_digest(b"other", &digest),
            Err(TransportError::DigestMismatch { .. })
        ));
        assert!(matches!(
            verify_digest(data, "sha512:abc"),
            Err(TransportError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_decompress_capped() {
        let compressed = gzip(b"target file contents");

        let data = decompress_capped(&compressed, "layer", 1024).unwrap();
        assert_eq!(&data[..], b"target file contents");

        let err = decompress_capped(&compressed, "layer", 5).unwrap_err();
        assert!(matches!(
            err,
            FetchError::LengthMismatch { length: 6, max_length: 5, .. }
        ));
    }

    #[test]
    fn test_base_url_scheme() {
        let config = FetchConfig::default();
        let client = OciClient::with_credentials(&config, CredentialChain::anonymous()).unwrap();

        assert_eq!(client.base_url("ghcr.io"), "https://ghcr.io");
        assert_eq!(client.base_url("docker.io"), "https://registry-1.docker.io");
        assert_eq!(client.base_url("127.0.0.1:5000"), "http://127.0.0.1:5000");
    }
}
