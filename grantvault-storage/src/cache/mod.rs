//! Cache layer over the shared key-value store.
//!
//! [`KvObjectCache`] stores typed values as JSON with the store's own TTL,
//! namespaced by each type's [`CacheEntry::TYPE_TAG`]. On top of it,
//! [`CachingActivityCheck`] memoizes the answer of an [`ActivityCheck`] per
//! subject for a fixed window.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(KvObjectCache::<IsActiveEntry>::builder().store(store).build()?);
//! let check = CachingActivityCheck::with_defaults(Arc::new(profile_service), cache);
//!
//! let mut ctx = ActivityContext::new(principal, "web", "AuthorizeEndpoint");
//! check.is_active(&mut ctx).await?;
//! ```

pub mod object_cache;
pub mod read_through;
pub mod traits;

pub use object_cache::{KvObjectCache, KvObjectCacheBuilder};
pub use read_through::{
    subject_key, ActivityCachingOptions, ActivityCheck, ActivityContext, CachePredicate,
    CachingActivityCheck, IsActiveEntry, KeySelector, ProfileDataContext, ProfileDataSource,
    DEFAULT_ACTIVITY_EXPIRATION,
};
pub use traits::{CacheEntry, CacheStats, ObjectCache};
