//! The fetch contract shared by all backends.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;

/// Retrieves the bytes behind a file address.
///
/// Called by the trust engine once per metadata file it needs and once per
/// requested target. Implementations take `&mut self`: a backend instance
/// owns its caches without locking and serves one fetch at a time. Sharing an
/// instance across tasks requires wrapping it in a mutex.
#[async_trait]
pub trait Fetcher: Send {
    /// Fetch `address`, failing if the content exceeds `max_length` bytes or
    /// the backend does not answer within `timeout`.
    ///
    /// `max_length` is always a hard limit: `0` accepts only empty files and
    /// never means "unlimited".
    async fn fetch(
        &mut self,
        address: &str,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, FetchError>;
}
