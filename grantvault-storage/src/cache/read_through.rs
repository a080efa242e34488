//! Read-through caching for activity checks.
//!
//! [`CachingActivityCheck`] wraps any [`ActivityCheck`] and remembers its
//! answer per cache key for a fixed expiration. It implements
//! [`ActivityCheck`] itself, so it can replace the inner check wherever one
//! is expected. When the inner check is also a [`ProfileDataSource`], profile
//! lookups pass straight through uncached.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grantvault_core::{normalize_prefix, Claim, ClaimsPrincipal, VaultResult};
use serde::{Deserialize, Serialize};

use super::traits::{CacheEntry, ObjectCache};

/// Default expiration for cached activity results.
pub const DEFAULT_ACTIVITY_EXPIRATION: Duration = Duration::from_secs(10 * 60);

/// Input and output of an activity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityContext {
    /// The principal being checked.
    pub subject: ClaimsPrincipal,
    /// Client requesting the check.
    pub client_id: String,
    /// Where the check was triggered from, e.g. `"AuthorizeEndpoint"`.
    pub caller: String,
    /// Result; implementations set this.
    pub is_active: bool,
}

impl ActivityContext {
    /// New context; `is_active` starts out `true`.
    pub fn new(subject: ClaimsPrincipal, client_id: impl Into<String>, caller: impl Into<String>) -> Self {
        Self {
            subject,
            client_id: client_id.into(),
            caller: caller.into(),
            is_active: true,
        }
    }
}

/// Decides whether a subject is still allowed to obtain tokens.
#[async_trait]
pub trait ActivityCheck: Send + Sync {
    /// Set `ctx.is_active` for the context's subject.
    async fn is_active(&self, ctx: &mut ActivityContext) -> VaultResult<()>;
}

/// Input and output of a profile data lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDataContext {
    pub subject: ClaimsPrincipal,
    pub client_id: String,
    pub caller: String,
    /// Claim types the caller asked for.
    pub requested_claim_types: Vec<String>,
    /// Result; implementations fill this in.
    pub issued_claims: Vec<Claim>,
}

impl ProfileDataContext {
    pub fn new(
        subject: ClaimsPrincipal,
        client_id: impl Into<String>,
        caller: impl Into<String>,
        requested_claim_types: Vec<String>,
    ) -> Self {
        Self {
            subject,
            client_id: client_id.into(),
            caller: caller.into(),
            requested_claim_types,
            issued_claims: Vec::new(),
        }
    }
}

/// Supplies the claims issued for a subject.
#[async_trait]
pub trait ProfileDataSource: Send + Sync {
    /// Fill `ctx.issued_claims` for the context's subject.
    async fn profile_data(&self, ctx: &mut ProfileDataContext) -> VaultResult<()>;
}

/// Cached result of an activity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsActiveEntry {
    pub is_active: bool,
}

impl CacheEntry for IsActiveEntry {
    const TYPE_TAG: &'static str = "is_active";
}

pub type KeySelector = Arc<dyn Fn(&ActivityContext) -> String + Send + Sync>;
pub type CachePredicate = Arc<dyn Fn(&ActivityContext) -> bool + Send + Sync>;

/// Configuration for [`CachingActivityCheck`].
#[derive(Clone)]
pub struct ActivityCachingOptions {
    /// Derives the cache key from a context.
    pub key_selector: KeySelector,
    /// Prepended to every derived key.
    pub key_prefix: String,
    /// How long a cached result stays valid.
    pub expiration: Duration,
    /// When set and returning `false`, the cache is bypassed entirely.
    pub should_cache: Option<CachePredicate>,
}

/// The context's `sub` claim, or an empty string.
pub fn subject_key(ctx: &ActivityContext) -> String {
    ctx.subject.subject_id().unwrap_or_default().to_string()
}

impl Default for ActivityCachingOptions {
    fn default() -> Self {
        Self {
            key_selector: Arc::new(subject_key),
            key_prefix: String::new(),
            expiration: DEFAULT_ACTIVITY_EXPIRATION,
            should_cache: None,
        }
    }
}

impl fmt::Debug for ActivityCachingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityCachingOptions")
            .field("key_prefix", &self.key_prefix)
            .field("expiration", &self.expiration)
            .field("should_cache", &self.should_cache.is_some())
            .finish_non_exhaustive()
    }
}

impl ActivityCachingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_selector<F>(mut self, selector: F) -> Self
    where
        F: Fn(&ActivityContext) -> String + Send + Sync + 'static,
    {
        self.key_selector = Arc::new(selector);
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_should_cache<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ActivityContext) -> bool + Send + Sync + 'static,
    {
        self.should_cache = Some(Arc::new(predicate));
        self
    }

    /// Full cache key for a context.
    pub fn cache_key(&self, ctx: &ActivityContext) -> String {
        format!("{}{}", normalize_prefix(&self.key_prefix), (self.key_selector)(ctx))
    }

    fn should_cache(&self, ctx: &ActivityContext) -> bool {
        self.should_cache.as_ref().map_or(true, |predicate| predicate(ctx))
    }
}

/// Read-through cache in front of an [`ActivityCheck`].
///
/// # Type Parameters
///
/// - `I`: the wrapped check, consulted on a miss
/// - `C`: the cache holding [`IsActiveEntry`] values
pub struct CachingActivityCheck<I, C>
where
    I: ActivityCheck,
    C: ObjectCache<IsActiveEntry>,
{
    inner: Arc<I>,
    cache: Arc<C>,
    options: ActivityCachingOptions,
}

impl<I, C> CachingActivityCheck<I, C>
where
    I: ActivityCheck,
    C: ObjectCache<IsActiveEntry>,
{
    pub fn new(inner: Arc<I>, cache: Arc<C>, options: ActivityCachingOptions) -> Self {
        Self { inner, cache, options }
    }

    /// Wrap with default options.
    pub fn with_defaults(inner: Arc<I>, cache: Arc<C>) -> Self {
        Self::new(inner, cache, ActivityCachingOptions::default())
    }

    pub fn options(&self) -> &ActivityCachingOptions {
        &self.options
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

impl<I, C> Clone for CachingActivityCheck<I, C>
where
    I: ActivityCheck,
    C: ObjectCache<IsActiveEntry>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cache: Arc::clone(&self.cache),
            options: self.options.clone(),
        }
    }
}

#[async_trait]
impl<I, C> ActivityCheck for CachingActivityCheck<I, C>
where
    I: ActivityCheck,
    C: ObjectCache<IsActiveEntry>,
{
    async fn is_active(&self, ctx: &mut ActivityContext) -> VaultResult<()> {
        if !self.options.should_cache(ctx) {
            tracing::debug!(caller = %ctx.caller, "activity cache bypassed");
            return self.inner.is_active(ctx).await;
        }

        let key = self.options.cache_key(ctx);
        if let Some(entry) = self.cache.get(&key).await? {
            ctx.is_active = entry.is_active;
            return Ok(());
        }

        self.inner.is_active(ctx).await?;
        let entry = IsActiveEntry {
            is_active: ctx.is_active,
        };
        self.cache.set(&key, &entry, self.options.expiration).await
    }
}

#[async_trait]
impl<I, C> ProfileDataSource for CachingActivityCheck<I, C>
where
    I: ActivityCheck + ProfileDataSource,
    C: ObjectCache<IsActiveEntry>,
{
    async fn profile_data(&self, ctx: &mut ProfileDataContext) -> VaultResult<()> {
        self.inner.profile_data(ctx).await
    }
}
