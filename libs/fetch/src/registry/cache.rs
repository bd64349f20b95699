//! In-memory manifest and layer cache.
//!
//! Keys are locator strings: `registry/repo:tag` for manifests and
//! `registry/repo@digest` for layers. Entries are write-once and never
//! evicted; a cache lives exactly as long as the backend instance that owns
//! it. The cache has no internal locking and relies on its owner's `&mut`
//! access.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::debug;

/// Cache statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub size_bytes: u64,
}

/// Write-once map from locator string to raw bytes.
#[derive(Debug, Default)]
pub struct ImageCache {
    entries: HashMap<String, Bytes>,
    stats: CacheStats,
}

impl ImageCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key`, recording a hit or miss.
    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        match self.entries.get(key) {
            Some(data) => {
                self.stats.hits += 1;
                debug!(key = %key, "Cache hit");
                Some(data.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store `data` under `key` unless an entry already exists.
    ///
    /// Returns the bytes now held for `key`, which are the earlier bytes if
    /// the key was already populated.
    pub fn insert(&mut self, key: impl Into<String>, data: Bytes) -> Bytes {
        let key = key.into();
        if let Some(existing) = self.entries.get(&key) {
            return existing.clone();
        }

        self.stats.entries += 1;
        self.stats.size_bytes += data.len() as u64;
        debug!(key = %key, size = data.len(), "Cached");

        self.entries.insert(key, data.clone());
        data
    }

    /// Check if `key` is cached without touching statistics.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
