//! Filesystem and HTTP backend.
//!
//! Local paths (bare or `file://`) are read whole and then checked against
//! the length limit. HTTP(S) bodies are streamed and abandoned as soon as
//! they pass `max_length + 1` bytes. A missing file and an HTTP 404 both
//! surface as [`FetchError::NotFound`].

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Response, StatusCode, Url};
use tracing::debug;

use crate::address::BackendLocator;
use crate::config::FetchConfig;
use crate::error::{FetchError, TransportError};
use crate::fetcher::Fetcher;

/// Fetches files by local path or URL.
#[derive(Debug, Clone)]
pub struct FilesystemFetcher {
    client: Client,
}

impl FilesystemFetcher {
    /// Create a new fetcher.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self { client })
    }

    /// Resolve an address to the path or URL it will be read from.
    pub fn locate(&self, address: &str) -> Result<BackendLocator, FetchError> {
        locate(address)
    }

    async fn read_local(
        &self,
        path: PathBuf,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let location = path.display().to_string();
        debug!(path = %location, "Reading local file");

        let data = tokio::time::timeout(timeout, tokio::fs::read(&path))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?;

        let data = match data {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FetchError::not_found(location));
            }
            Err(e) => return Err(e.into()),
        };

        let length = data.len() as u64;
        if length > max_length {
            return Err(FetchError::length_mismatch(location, length, max_length));
        }

        Ok(Bytes::from(data))
    }

    async fn download(
        &self,
        url: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        debug!(url = %url, "Downloading file");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(FetchError::not_found(url)),
            status => {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                }
                .into())
            }
        }

        if let Some(length) = response.content_length() {
            if length > max_length {
                return Err(FetchError::length_mismatch(url, length, max_length));
            }
        }

        read_capped(response, url, max_length, timeout).await
    }
}

#[async_trait]
impl Fetcher for FilesystemFetcher {
    async fn fetch(
        &mut self,
        address: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        match locate(address)? {
            BackendLocator::Path(path) => self.read_local(path, max_length, timeout).await,
            BackendLocator::Url(url) => self.download(&url, max_length, timeout).await,
            BackendLocator::Registry(_) => Err(FetchError::configuration(format!(
                "registry address {address} given to the filesystem backend"
            ))),
        }
    }
}

fn locate(address: &str) -> Result<BackendLocator, FetchError> {
    if address.starts_with("http://") || address.starts_with("https://") {
        return Ok(BackendLocator::Url(address.to_string()));
    }

    if address.starts_with("file://") {
        let url = Url::parse(address)
            .map_err(|e| TransportError::InvalidAddress(format!("{address}: {e}")))?;
        let path = url
            .to_file_path()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;
        return Ok(BackendLocator::Path(path));
    }

    if address.contains("://") {
        return Err(FetchError::configuration(format!(
            "unsupported address scheme: {address}"
        )));
    }

    Ok(BackendLocator::Path(PathBuf::from(address)))
}

/// Read a response body, failing once more than `max_length` bytes arrive.
///
/// Never buffers more than `max_length + 1` bytes.
pub(crate) async fn read_capped(
    mut response: Response,
    location: &str,
    max_length: u64,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    let limit = max_length.saturating_add(1);
    let mut buf = BytesMut::new();

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| transport_error(e, timeout))?
    {
        let remaining = limit - buf.len() as u64;
        let take = (chunk.len() as u64).min(remaining) as usize;
        buf.extend_from_slice(&chunk[..take]);

        if buf.len() as u64 > max_length {
            return Err(FetchError::length_mismatch(
                location,
                buf.len() as u64,
                max_length,
            ));
        }
    }

    Ok(buf.freeze())
}

/// Map a reqwest error, reporting timeouts as such.
pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        TransportError::Timeout(timeout).into()
    } else {
        err.into()
    }
}
