//! Object cache trait and cacheable entry marker.

use std::time::Duration;

use async_trait::async_trait;
use grantvault_core::VaultResult;
use serde::{de::DeserializeOwned, Serialize};

/// Marker trait for types that can be stored in an [`ObjectCache`].
///
/// `TYPE_TAG` namespaces cache keys, so two entry types cached under the same
/// caller key never overwrite each other. Tags must be unique per type and
/// stable across releases; changing one orphans every existing entry.
pub trait CacheEntry: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE_TAG: &'static str;
}

/// Typed get/set cache with per-entry expiration.
#[async_trait]
pub trait ObjectCache<T: CacheEntry>: Send + Sync {
    /// Get a cached item. Missing and expired entries are `None`.
    async fn get(&self, key: &str) -> VaultResult<Option<T>>;

    /// Cache an item for `expiration`, replacing any previous entry.
    async fn set(&self, key: &str, item: &T, expiration: Duration) -> VaultResult<()>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries written.
    pub writes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
