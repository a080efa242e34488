//! grantvault storage - TTL-indexed grant store and caches
//!
//! Persists grants in a TTL-capable key-value store and keeps per-subject
//! secondary indexes so grants can be listed by subject, client and type.
//! The store expires grant records on its own; index entries pointing at
//! expired records are pruned lazily on later reads and writes.
//!
//! # Layout
//!
//! - [`kv`]: the [`KeyValueStore`] capability and its [`Transaction`] builder
//! - [`memory`]: an in-process [`KeyValueStore`] with clock-driven expiry
//! - [`connection`]: the lazily connected [`SharedConnection`]
//! - [`keyspace`]: primary and index key derivation
//! - [`grant_store`]: [`PersistedGrantStore`] and its [`GrantStore`] implementation
//! - [`cache`]: typed object cache and the read-through activity check

pub mod cache;
pub mod connection;
pub mod grant_store;
pub mod keyspace;
pub mod kv;
pub mod memory;

pub use cache::{
    ActivityCachingOptions, ActivityCheck, ActivityContext, CacheEntry, CacheStats,
    CachingActivityCheck, IsActiveEntry, KvObjectCache, ObjectCache, ProfileDataContext,
    ProfileDataSource,
};
pub use connection::{InMemoryConnector, SharedConnection, StoreConnector};
pub use grant_store::{GrantStore, PersistedGrantStore};
pub use keyspace::{GrantIndexKeys, IndexLevel, KeySpace};
pub use kv::{ExpireMode, KeyValueStore, Transaction, TxOp};
pub use memory::InMemoryKeyValueStore;
