//! grantvault Test Utilities
//!
//! Shared test infrastructure for the grantvault workspace:
//! - Fault-injecting store and counting activity check
//! - Proptest generators for grants, filters and claims
//! - Test fixtures for common scenarios
//! - Custom assertions for grantvault error kinds

pub use grantvault_core::{
    Claim, ClaimsPrincipal, Clock, Grant, GrantFilter, ManualClock, StorageError, StoreOptions,
    Timestamp, VaultError, VaultResult,
};
pub use grantvault_storage::{
    ActivityCheck, ActivityContext, ExpireMode, GrantStore, InMemoryKeyValueStore, KeyValueStore,
    Transaction,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// MOCKS
// ============================================================================

/// [`KeyValueStore`] wrapper that fails selected operations on demand.
///
/// Everything not switched off is forwarded to the wrapped store.
pub struct FaultyStore {
    inner: Arc<dyn KeyValueStore>,
    fail_transactions: AtomicBool,
    reject_transactions: AtomicBool,
    fail_reads: AtomicBool,
    transactions: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner,
            fail_transactions: AtomicBool::new(false),
            reject_transactions: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            transactions: AtomicUsize::new(0),
        }
    }

    /// Make `execute` return a `TransactionFailed` error.
    pub fn fail_transactions(&self, fail: bool) {
        self.fail_transactions.store(fail, Ordering::SeqCst);
    }

    /// Make `execute` report the transaction as not committed.
    pub fn reject_transactions(&self, reject: bool) {
        self.reject_transactions.store(reject, Ordering::SeqCst);
    }

    /// Make `string_get`, `batch_get` and `set_members` fail as unavailable.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of transactions handed to `execute`, including failed ones.
    pub fn transaction_count(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> VaultResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "injected read failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    async fn string_get(&self, key: &str) -> VaultResult<Option<String>> {
        self.check_read()?;
        self.inner.string_get(key).await
    }

    async fn string_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> VaultResult<()> {
        self.inner.string_set(key, value, ttl).await
    }

    async fn batch_get(&self, keys: &[String]) -> VaultResult<Vec<Option<String>>> {
        self.check_read()?;
        self.inner.batch_get(keys).await
    }

    async fn set_add(&self, key: &str, member: &str) -> VaultResult<bool> {
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> VaultResult<u64> {
        self.inner.set_remove(key, members).await
    }

    async fn set_members(&self, key: &str) -> VaultResult<Vec<String>> {
        self.check_read()?;
        self.inner.set_members(key).await
    }

    async fn key_expire(&self, key: &str, ttl: Duration, mode: ExpireMode) -> VaultResult<bool> {
        self.inner.key_expire(key, ttl, mode).await
    }

    async fn key_time_to_live(&self, key: &str) -> VaultResult<Option<Duration>> {
        self.inner.key_time_to_live(key).await
    }

    async fn key_delete(&self, keys: &[String]) -> VaultResult<u64> {
        self.inner.key_delete(keys).await
    }

    async fn execute(&self, transaction: Transaction) -> VaultResult<bool> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        if self.fail_transactions.load(Ordering::SeqCst) {
            return Err(StorageError::TransactionFailed {
                reason: "injected transaction failure".to_string(),
            }
            .into());
        }
        if self.reject_transactions.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.execute(transaction).await
    }
}

/// Activity check with a fixed answer that counts its invocations.
#[derive(Debug, Default)]
pub struct CountingActivityCheck {
    answer: bool,
    calls: AtomicUsize,
}

impl CountingActivityCheck {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivityCheck for CountingActivityCheck {
    async fn is_active(&self, ctx: &mut ActivityContext) -> VaultResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.is_active = self.answer;
        Ok(())
    }
}

/// Install a test-friendly tracing subscriber once per process.
///
/// Respects `RUST_LOG`; later calls are ignored.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for grants, filters and claims.

    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate an opaque grant handle.
    pub fn arb_grant_key() -> impl Strategy<Value = String> {
        any::<[u8; 16]>().prop_map(|b| Uuid::from_bytes(b).simple().to_string())
    }

    /// Identifier safe to embed in an index key (no `:`).
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,11}"
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // Generate timestamps within a reasonable range (2020-2030)
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Lifetime of a grant in whole seconds, always positive.
    pub fn arb_lifetime_secs() -> impl Strategy<Value = i64> {
        1i64..86_400
    }

    /// Generate a Claim, sometimes with non-default metadata.
    pub fn arb_claim() -> impl Strategy<Value = Claim> {
        (
            arb_identifier(),
            ".{0,24}",
            proptest::option::of(Just("http://www.w3.org/2001/XMLSchema#integer")),
            proptest::option::of("https://[a-z]{3,8}\\.example"),
            any::<bool>(),
        )
            .prop_map(|(claim_type, value, value_type, issuer, same_origin)| {
                let mut claim = Claim::new(claim_type, value);
                if let Some(value_type) = value_type {
                    claim = claim.with_value_type(value_type);
                }
                if let Some(issuer) = issuer {
                    claim = claim.with_issuer(issuer);
                }
                if !same_origin {
                    claim = claim.with_original_issuer("https://origin.example");
                }
                claim
            })
    }

    /// Generate a principal with a `sub` claim plus extra claims.
    pub fn arb_principal() -> impl Strategy<Value = ClaimsPrincipal> {
        (arb_identifier(), prop::collection::vec(arb_claim(), 0..4)).prop_map(|(subject, extra)| {
            let mut principal = ClaimsPrincipal::for_subject(subject);
            principal.claims.extend(extra);
            principal
        })
    }

    /// Generate a fully populated grant created at `now`.
    pub fn arb_grant(now: Timestamp) -> impl Strategy<Value = Grant> {
        (
            arb_grant_key(),
            arb_identifier(),
            arb_identifier(),
            arb_identifier(),
            proptest::option::of(arb_identifier()),
            proptest::option::of(".{0,32}"),
            arb_lifetime_secs(),
            ".{0,64}",
        )
            .prop_map(
                move |(key, subject, client, kind, session, description, lifetime, data)| {
                    let mut grant = Grant::new(key, data, now, now + chrono::Duration::seconds(lifetime))
                        .with_subject(subject)
                        .with_client(client)
                        .with_type(kind);
                    grant.session_id = session;
                    grant.description = description;
                    grant
                },
            )
    }

    /// Grants for one subject spread over a few clients and types.
    pub fn arb_subject_grants(
        subject: String,
        now: Timestamp,
        max: usize,
    ) -> impl Strategy<Value = Vec<Grant>> {
        let clients = prop::sample::select(vec!["client1", "client2", "client3"]);
        let kinds = prop::sample::select(vec!["type1", "type2"]);
        prop::collection::vec(
            (arb_grant_key(), clients, kinds, arb_lifetime_secs()),
            1..=max,
        )
        .prop_map(move |specs| {
            specs
                .into_iter()
                .map(|(key, client, kind, lifetime)| {
                    Grant::new(key, "data", now, now + chrono::Duration::seconds(lifetime))
                        .with_subject(subject.clone())
                        .with_client(client)
                        .with_type(kind)
                })
                .collect()
        })
    }

    /// Generate a filter for `subject` with optional client and type.
    pub fn arb_filter(subject: String) -> impl Strategy<Value = GrantFilter> {
        (
            proptest::option::of(prop::sample::select(vec!["client1", "client2", "client3"])),
            proptest::option::of(prop::sample::select(vec!["type1", "type2"])),
        )
            .prop_map(move |(client, kind)| {
                let mut filter = GrantFilter::for_subject(subject.clone());
                filter.client_id = client.map(str::to_string);
                filter.grant_type = kind.map(str::to_string);
                filter
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Grant store over a fresh in-memory store, both driven by a manual clock.
    pub struct TestBed {
        pub clock: Arc<ManualClock>,
        pub kv: Arc<InMemoryKeyValueStore>,
        pub store: GrantStore,
    }

    impl TestBed {
        pub fn new() -> Self {
            Self::with_options(StoreOptions::new())
        }

        pub fn with_options(options: StoreOptions) -> Self {
            let clock = Arc::new(ManualClock::starting_now());
            let kv = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
            let store = GrantStore::new(kv.clone(), &options, clock.clone());
            Self { clock, kv, store }
        }

        pub fn now(&self) -> Timestamp {
            self.clock.now()
        }
    }

    impl Default for TestBed {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Grant store over a [`FaultyStore`] wrapping an in-memory store.
    pub fn faulty_bed() -> (Arc<ManualClock>, Arc<FaultyStore>, GrantStore) {
        let clock = Arc::new(ManualClock::starting_now());
        let kv = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
        let faulty = Arc::new(FaultyStore::new(kv));
        let store = GrantStore::new(faulty.clone(), &StoreOptions::new(), clock.clone());
        (clock, faulty, store)
    }

    /// Grant for `subject` that lives for `lifetime` from `now`.
    pub fn grant(
        key: &str,
        subject: &str,
        client: &str,
        kind: &str,
        now: Timestamp,
        lifetime: Duration,
    ) -> Grant {
        let expiration = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        Grant::new(key, format!("payload-{}", key), now, expiration)
            .with_subject(subject)
            .with_client(client)
            .with_type(kind)
    }

    /// Five grants for one subject and client, the first `type1_count` of
    /// type `type1` and the rest of type `type2`. Each has its own session.
    pub fn five_grants(subject: &str, client: &str, type1_count: usize, now: Timestamp) -> Vec<Grant> {
        (0..5)
            .map(|i| {
                let kind = if i < type1_count { "type1" } else { "type2" };
                grant(
                    &format!("{}-{}-{}", subject, client, i),
                    subject,
                    client,
                    kind,
                    now,
                    Duration::from_secs(60),
                )
                .with_session(format!("session{}", i))
            })
            .collect()
    }

    /// Activity context for a subject.
    pub fn activity_context(subject: &str) -> ActivityContext {
        ActivityContext::new(ClaimsPrincipal::for_subject(subject), "client", "test")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for grantvault error kinds.

    use super::*;

    /// Assert that a VaultResult is an invalid-argument error.
    #[track_caller]
    pub fn assert_invalid_argument<T: std::fmt::Debug>(result: &VaultResult<T>) {
        match result {
            Err(e) if e.is_invalid_argument() => {}
            other => panic!("Expected InvalidArgument, got: {:?}", other),
        }
    }

    /// Assert that a VaultResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &VaultResult<T>) {
        match result {
            Err(VaultError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a VaultResult is a TransactionFailed storage error.
    #[track_caller]
    pub fn assert_transaction_failed<T: std::fmt::Debug>(result: &VaultResult<T>) {
        match result {
            Err(VaultError::Storage(StorageError::TransactionFailed { .. })) => {}
            other => panic!("Expected TransactionFailed, got: {:?}", other),
        }
    }

    /// Assert that two grant lists hold the same keys, ignoring order.
    #[track_caller]
    pub fn assert_same_keys(actual: &[Grant], expected: &[Grant]) {
        let mut actual: Vec<&str> = actual.iter().map(|g| g.key.as_str()).collect();
        let mut expected: Vec<&str> = expected.iter().map(|g| g.key.as_str()).collect();
        actual.sort_unstable();
        expected.sort_unstable();
        assert_eq!(actual, expected, "grant keys differ");
    }
}

// ============================================================================
// TESTS
// ============================================================================
