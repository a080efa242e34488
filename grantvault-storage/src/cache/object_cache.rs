//! [`ObjectCache`] over a [`KeyValueStore`].
//!
//! Entries are stored as JSON strings under
//! `{prefix}{T::TYPE_TAG}:{key}` with the store's own TTL, so expiry needs no
//! bookkeeping here.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grantvault_core::{normalize_prefix, StorageError, VaultError, VaultResult};

use super::traits::{CacheEntry, CacheStats, ObjectCache};
use crate::kv::KeyValueStore;

/// Cache of `T` values backed by a key-value store.
pub struct KvObjectCache<T: CacheEntry> {
    store: Arc<dyn KeyValueStore>,
    key_prefix: String,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

/// Builder for [`KvObjectCache`].
pub struct KvObjectCacheBuilder<T: CacheEntry> {
    store: Option<Arc<dyn KeyValueStore>>,
    key_prefix: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CacheEntry> Default for KvObjectCacheBuilder<T> {
    fn default() -> Self {
        Self {
            store: None,
            key_prefix: String::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: CacheEntry> KvObjectCacheBuilder<T> {
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Build the cache. Fails if no store was provided.
    pub fn build(self) -> VaultResult<KvObjectCache<T>> {
        let store = self
            .store
            .ok_or_else(|| VaultError::invalid_argument("store", "a key-value store is required"))?;
        Ok(KvObjectCache {
            store,
            key_prefix: normalize_prefix(&self.key_prefix),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            _marker: PhantomData,
        })
    }
}

impl<T: CacheEntry> KvObjectCache<T> {
    pub fn builder() -> KvObjectCacheBuilder<T> {
        KvObjectCacheBuilder::default()
    }

    /// Store key for a caller-supplied cache key.
    pub fn entry_key(&self, key: &str) -> String {
        format!("{}{}:{}", self.key_prefix, T::TYPE_TAG, key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

impl<T: CacheEntry> std::fmt::Debug for KvObjectCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvObjectCache")
            .field("type_tag", &T::TYPE_TAG)
            .field("key_prefix", &self.key_prefix)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: CacheEntry> ObjectCache<T> for KvObjectCache<T> {
    async fn get(&self, key: &str) -> VaultResult<Option<T>> {
        let entry_key = self.entry_key(key);
        let Some(data) = self.store.string_get(&entry_key).await?.filter(|d| !d.is_empty()) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, type_tag = T::TYPE_TAG, "cache miss");
            return Ok(None);
        };

        let item = serde_json::from_str(&data).map_err(|e| StorageError::Serialization {
            key: entry_key,
            reason: e.to_string(),
        })?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, type_tag = T::TYPE_TAG, "cache hit");
        Ok(Some(item))
    }

    async fn set(&self, key: &str, item: &T, expiration: Duration) -> VaultResult<()> {
        let entry_key = self.entry_key(key);
        let data = serde_json::to_string(item).map_err(|e| StorageError::Serialization {
            key: entry_key.clone(),
            reason: e.to_string(),
        })?;
        self.store.string_set(&entry_key, &data, Some(expiration)).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            key = %key,
            type_tag = T::TYPE_TAG,
            expiration_secs = expiration.as_secs(),
            "persisted cache entry"
        );
        Ok(())
    }
}
