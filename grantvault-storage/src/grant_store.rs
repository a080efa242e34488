//! Persisted grant store with secondary indexes.
//!
//! Each grant with a subject is listed in three index sets (subject,
//! subject+client, subject+client+type). Writes keep the primary record and
//! its index entries in one transaction. The store expires primary records on
//! its own, so index sets may list keys whose record is gone; reads detect
//! those dangling entries and prune them on a best-effort basis. Inside a
//! tokio runtime that pruning runs as a background task, so `get_all` does
//! not wait on it.
//!
//! Write paths log and return every failure. Cleanup that is not the point of
//! the call (pruning, the pre-write dangling scan) logs and carries on.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use grantvault_core::{
    remaining, Clock, Grant, GrantFilter, StorageError, StoreOptions, VaultError, VaultResult,
};

use crate::connection::SharedConnection;
use crate::keyspace::{IndexLevel, KeySpace};
use crate::kv::{ExpireMode, KeyValueStore, Transaction};

/// Operations upstream consumers need from a grant store.
#[async_trait]
pub trait PersistedGrantStore: Send + Sync {
    /// Insert or overwrite a grant.
    async fn store(&self, grant: &Grant) -> VaultResult<()>;

    /// Get a grant by key. Missing and expired grants are `None`.
    async fn get(&self, key: &str) -> VaultResult<Option<Grant>>;

    /// All live grants matching a filter. The filter must name a subject.
    async fn get_all(&self, filter: &GrantFilter) -> VaultResult<Vec<Grant>>;

    /// Delete a grant by key. Deleting a missing grant is a no-op.
    async fn remove(&self, key: &str) -> VaultResult<()>;

    /// Delete every grant matching a filter. The filter must name a subject.
    async fn remove_all(&self, filter: &GrantFilter) -> VaultResult<()>;
}

/// Members of one index set, split by whether their record still exists.
#[derive(Debug, Default)]
struct IndexScan {
    /// `(primary key, grant)` pairs.
    present: Vec<(String, Grant)>,
    /// Primary keys whose record has expired or been deleted.
    dangling: Vec<String>,
}

/// [`PersistedGrantStore`] backed by a [`KeyValueStore`].
#[derive(Clone)]
pub struct GrantStore {
    store: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for GrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantStore")
            .field("keys", &self.keys)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl GrantStore {
    /// Create a grant store over an existing store handle.
    pub fn new(store: Arc<dyn KeyValueStore>, options: &StoreOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            keys: KeySpace::new(&options.key_prefix),
            clock,
        }
    }

    /// Create a grant store over a shared connection, connecting on first use.
    pub async fn connect(connection: &SharedConnection, clock: Arc<dyn Clock>) -> VaultResult<Self> {
        let store = connection.store().await?;
        Ok(Self::new(store, connection.options(), clock))
    }

    pub fn keyspace(&self) -> &KeySpace {
        &self.keys
    }

    fn select(&self, filter: &GrantFilter) -> VaultResult<(String, IndexLevel, Vec<String>)> {
        self.keys
            .index_for_filter(filter)
            .ok_or_else(|| VaultError::invalid_argument("filter.subject_id", "a subject is required"))
    }

    async fn commit(&self, transaction: Transaction, operation: &str) -> VaultResult<()> {
        if transaction.is_empty() {
            return Ok(());
        }
        if self.store.execute(transaction).await? {
            Ok(())
        } else {
            Err(StorageError::TransactionFailed {
                reason: format!("{} transaction was not committed", operation),
            }
            .into())
        }
    }

    async fn scan(&self, index_key: &str) -> VaultResult<IndexScan> {
        let members = self.store.set_members(index_key).await?;
        if members.is_empty() {
            return Ok(IndexScan::default());
        }
        let values = self.store.batch_get(&members).await?;

        let mut scan = IndexScan::default();
        for (member, value) in members.into_iter().zip(values) {
            match value.filter(|v| !v.is_empty()) {
                Some(data) => match decode(&member, &data) {
                    Ok(grant) => scan.present.push((member, grant)),
                    // Neither present nor dangling: the record stays where it is.
                    Err(e) => tracing::warn!(
                        index = %index_key,
                        key = %member,
                        error = %e,
                        "skipping undecodable grant record"
                    ),
                },
                None => scan.dangling.push(member),
            }
        }
        Ok(scan)
    }

    /// Prune on a background task when a tokio runtime is available,
    /// inline otherwise.
    async fn schedule_prune(&self, index_key: String, coarser: Vec<String>, dangling: Vec<String>) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let this = self.clone();
                runtime.spawn(async move { this.prune(&index_key, &coarser, &dangling).await });
            }
            Err(_) => self.prune(&index_key, &coarser, &dangling).await,
        }
    }

    /// Drop dangling keys from an index and the coarser ones above it.
    async fn prune(&self, index_key: &str, coarser: &[String], dangling: &[String]) {
        // A key stored again since the scan is no longer dangling.
        let dangling: Vec<String> = match self.store.batch_get(dangling).await {
            Ok(values) => dangling
                .iter()
                .zip(values)
                .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
                .map(|(key, _)| key.clone())
                .collect(),
            Err(e) => {
                tracing::warn!(
                    index = %index_key,
                    error = %e,
                    "failed to recheck dangling grant references"
                );
                return;
            }
        };
        if dangling.is_empty() {
            return;
        }

        let mut tx = Transaction::new();
        for key in std::iter::once(index_key).chain(coarser.iter().map(String::as_str)) {
            tx.set_remove(key, dangling.clone());
        }
        match self.commit(tx, "prune").await {
            Ok(()) => tracing::debug!(
                index = %index_key,
                pruned = dangling.len(),
                "pruned dangling grant references"
            ),
            Err(e) => tracing::warn!(
                index = %index_key,
                error = %e,
                "failed to prune dangling grant references"
            ),
        }
    }

    async fn store_grant(&self, grant: &Grant) -> VaultResult<()> {
        let data = grant.to_json().map_err(|e| StorageError::Serialization {
            key: grant.key.clone(),
            reason: e.to_string(),
        })?;
        let grant_key = self.keys.primary(&grant.key);
        let expires_in = remaining(self.clock.as_ref(), grant.expiration);

        let Some(indexes) = self.keys.grant_indexes(grant) else {
            return self.store.string_set(&grant_key, &data, Some(expires_in)).await;
        };

        let dangling: Vec<String> = match self.scan(&indexes.subject).await {
            Ok(scan) => scan.dangling.into_iter().filter(|k| *k != grant_key).collect(),
            Err(e) => {
                tracing::warn!(
                    index = %indexes.subject,
                    error = %e,
                    "skipping dangling reference scan before store"
                );
                Vec::new()
            }
        };

        let mut tx = Transaction::new();
        tx.string_set(&grant_key, data, Some(expires_in));
        for index in indexes.all() {
            tx.set_add(index, &grant_key)
                .key_expire(index, expires_in, ExpireMode::ExtendOnly)
                .set_remove(index, dangling.clone());
        }
        self.commit(tx, "store").await
    }

    async fn remove_grant(&self, key: &str) -> VaultResult<()> {
        let Some(grant) = self.get(key).await? else {
            tracing::debug!(key = %key, "no persisted grant found to remove");
            return Ok(());
        };
        let grant_key = self.keys.primary(key);
        tracing::debug!(key = %key, "removing persisted grant");

        let mut tx = Transaction::new();
        tx.key_delete(vec![grant_key.clone()]);
        if let Some(indexes) = self.keys.grant_indexes(&grant) {
            for index in indexes.all() {
                tx.set_remove(index, vec![grant_key.clone()]);
            }
        }
        self.commit(tx, "remove").await
    }

    async fn remove_matching(&self, filter: &GrantFilter) -> VaultResult<()> {
        let (index_key, level, coarser) = self.select(filter)?;
        let scan = self.scan(&index_key).await?;
        let matched: Vec<(String, Grant)> = scan
            .present
            .into_iter()
            .filter(|(_, grant)| filter.matches(grant))
            .collect();

        tracing::debug!(
            subject_id = ?filter.subject(),
            client_id = ?filter.client(),
            grant_type = ?filter.kind(),
            session_id = ?filter.session(),
            count = matched.len(),
            "removing persisted grants"
        );
        if matched.is_empty() && scan.dangling.is_empty() {
            return Ok(());
        }

        // Unlink every matched grant from each of its own index sets.
        let mut unlink: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (grant_key, grant) in &matched {
            if let Some(indexes) = self.keys.grant_indexes(grant) {
                for index in indexes.all() {
                    unlink.entry(index.to_string()).or_default().push(grant_key.clone());
                }
            }
        }

        let mut tx = Transaction::new();
        tx.key_delete(matched.iter().map(|(k, _)| k.clone()).collect());

        if level.covers(filter) {
            unlink.remove(&index_key);
            tx.key_delete(vec![index_key.clone()]);
            for key in &coarser {
                tx.set_remove(key, scan.dangling.clone());
            }
        } else {
            tx.set_remove(&index_key, scan.dangling.clone());
        }
        for (index, members) in unlink {
            tx.set_remove(index, members);
        }

        self.commit(tx, "remove_all").await
    }
}

fn decode(key: &str, data: &str) -> VaultResult<Grant> {
    Grant::from_json(data).map_err(|e| {
        StorageError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl PersistedGrantStore for GrantStore {
    async fn store(&self, grant: &Grant) -> VaultResult<()> {
        if grant.key.is_empty() {
            return Err(VaultError::invalid_argument("grant.key", "must not be empty"));
        }

        match self.store_grant(grant).await {
            Ok(()) => {
                tracing::debug!(
                    subject_id = ?grant.subject_id,
                    client_id = ?grant.client_id,
                    grant_type = ?grant.grant_type,
                    "grant persisted successfully"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    subject_id = ?grant.subject_id,
                    client_id = ?grant.client_id,
                    grant_type = ?grant.grant_type,
                    error = %e,
                    "failed to store persisted grant"
                );
                Err(e)
            }
        }
    }

    async fn get(&self, key: &str) -> VaultResult<Option<Grant>> {
        let data = self.store.string_get(&self.keys.primary(key)).await?;
        let data = data.filter(|d| !d.is_empty());
        tracing::debug!(key = %key, found = data.is_some(), "persisted grant lookup");
        data.map(|d| decode(key, &d)).transpose()
    }

    async fn get_all(&self, filter: &GrantFilter) -> VaultResult<Vec<Grant>> {
        let (index_key, _, coarser) = self.select(filter)?;
        let scan = self.scan(&index_key).await?;
        if !scan.dangling.is_empty() {
            self.schedule_prune(index_key, coarser, scan.dangling).await;
        }

        // Record fields win over index membership: an overwritten grant may
        // still be listed under its previous client or type.
        let grants: Vec<Grant> = scan
            .present
            .into_iter()
            .map(|(_, grant)| grant)
            .filter(|grant| filter.matches(grant))
            .collect();

        tracing::debug!(
            subject_id = ?filter.subject(),
            count = grants.len(),
            "persisted grants found"
        );
        Ok(grants)
    }

    async fn remove(&self, key: &str) -> VaultResult<()> {
        self.remove_grant(key).await.inspect_err(|e| {
            tracing::error!(key = %key, error = %e, "failed to remove persisted grant");
        })
    }

    async fn remove_all(&self, filter: &GrantFilter) -> VaultResult<()> {
        self.remove_matching(filter).await.inspect_err(|e| {
            tracing::error!(
                subject_id = ?filter.subject(),
                client_id = ?filter.client(),
                grant_type = ?filter.kind(),
                error = %e,
                "failed to remove persisted grants"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryKeyValueStore;
    use chrono::Duration as ChronoDuration;
    use grantvault_core::ManualClock;
    use std::time::Duration;

    struct Harness {
        clock: Arc<ManualClock>,
        kv: Arc<InMemoryKeyValueStore>,
        store: GrantStore,
    }

    fn harness_with_prefix(prefix: &str) -> Harness {
        let clock = Arc::new(ManualClock::starting_now());
        let kv = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
        let options = StoreOptions::new().with_key_prefix(prefix);
        let store = GrantStore::new(kv.clone(), &options, clock.clone());
        Harness { clock, kv, store }
    }

    fn harness() -> Harness {
        harness_with_prefix("")
    }

    fn make_grant(h: &Harness, key: &str, client: &str, kind: &str, ttl_secs: i64) -> Grant {
        let now = h.clock.now();
        Grant::new(key, format!("data-{}", key), now, now + ChronoDuration::seconds(ttl_secs))
            .with_subject("S")
            .with_client(client)
            .with_type(kind)
    }

    async fn keys_of(store: &GrantStore, filter: GrantFilter) -> Vec<String> {
        let mut keys: Vec<String> = store
            .get_all(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.key)
            .collect();
        keys.sort();
        keys
    }

    // Let spawned pruning tasks run on the test runtime.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_store_then_get() {
        let h = harness();
        let grant = make_grant(&h, "k1", "client1", "type1", 60).with_session("sess");
        h.store.store(&grant).await.unwrap();

        let fetched = h.store.get("k1").await.unwrap();
        assert_eq!(fetched, Some(grant));
        assert_eq!(keys_of(&h.store, GrantFilter::for_subject("S")).await, vec!["k1"]);
    }

    #[tokio::test]
    async fn test_store_rejects_empty_key() {
        let h = harness();
        let grant = make_grant(&h, "", "client1", "type1", 60);
        let err = h.store.store(&grant).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let h = harness();
        assert_eq!(h.store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_empty_value_is_none() {
        let h = harness();
        h.kv.string_set("k1", "", None).await.unwrap();
        assert_eq!(h.store.get("k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_grant_without_subject_is_not_indexed() {
        let h = harness();
        let now = h.clock.now();
        let grant = Grant::new("orphan", "d", now, now + ChronoDuration::seconds(30));
        h.store.store(&grant).await.unwrap();

        assert_eq!(h.store.get("orphan").await.unwrap(), Some(grant));
        assert_eq!(h.kv.key_count().unwrap(), 1);
        assert_eq!(
            h.kv.key_time_to_live("orphan").await.unwrap(),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn test_store_writes_all_three_indexes_with_prefix() {
        let h = harness_with_prefix("app");
        h.store
            .store(&make_grant(&h, "k1", "c", "t", 60))
            .await
            .unwrap();

        for index in ["app:S", "app:S:c", "app:S:c:t"] {
            assert_eq!(
                h.kv.set_members(index).await.unwrap(),
                vec!["app:k1".to_string()],
                "index {}",
                index
            );
            assert_eq!(
                h.kv.key_time_to_live(index).await.unwrap(),
                Some(Duration::from_secs(60))
            );
        }
    }

    #[tokio::test]
    async fn test_restore_same_key_does_not_duplicate() {
        let h = harness();
        let grant = make_grant(&h, "k1", "client1", "type1", 60);
        h.store.store(&grant).await.unwrap();
        h.store.store(&grant).await.unwrap();
        assert_eq!(keys_of(&h.store, GrantFilter::for_subject("S")).await, vec!["k1"]);
    }

    #[tokio::test]
    async fn test_grant_expires() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "k1", "client1", "type1", 1))
            .await
            .unwrap();
        assert!(h.store.get("k1").await.unwrap().is_some());

        h.clock.advance(Duration::from_secs(2));
        assert!(h.store.get("k1").await.unwrap().is_none());
        assert!(h
            .store
            .get_all(&GrantFilter::for_subject("S"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_already_expired_grant_is_accepted() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "k1", "client1", "type1", -10))
            .await
            .unwrap();
        assert!(h.store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_ttl_only_extends() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "long", "c", "t", 100))
            .await
            .unwrap();
        h.store
            .store(&make_grant(&h, "short", "c", "t", 10))
            .await
            .unwrap();
        assert_eq!(
            h.kv.key_time_to_live("S").await.unwrap(),
            Some(Duration::from_secs(100))
        );

        h.store
            .store(&make_grant(&h, "longer", "c", "t", 500))
            .await
            .unwrap();
        assert_eq!(
            h.kv.key_time_to_live("S:c:t").await.unwrap(),
            Some(Duration::from_secs(500))
        );
    }

    #[tokio::test]
    async fn test_get_all_specificity() {
        let h = harness();
        for (key, client, kind) in [
            ("a", "c1", "t1"),
            ("b", "c1", "t2"),
            ("c", "c2", "t1"),
        ] {
            h.store
                .store(&make_grant(&h, key, client, kind, 60))
                .await
                .unwrap();
        }

        assert_eq!(
            keys_of(&h.store, GrantFilter::for_subject("S")).await,
            vec!["a", "b", "c"]
        );
        assert_eq!(
            keys_of(&h.store, GrantFilter::for_subject("S").with_client("c1")).await,
            vec!["a", "b"]
        );
        assert_eq!(
            keys_of(
                &h.store,
                GrantFilter::for_subject("S").with_client("c1").with_type("t1")
            )
            .await,
            vec!["a"]
        );
        assert_eq!(
            keys_of(&h.store, GrantFilter::for_subject("S").with_type("t1")).await,
            vec!["a", "c"]
        );
        assert!(keys_of(&h.store, GrantFilter::for_subject("unknown"))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_get_all_filters_by_session() {
        let h = harness();
        for (key, session) in [("a", "s1"), ("b", "s2")] {
            let grant = make_grant(&h, key, "c1", "t1", 60).with_session(session);
            h.store.store(&grant).await.unwrap();
        }
        assert_eq!(
            keys_of(
                &h.store,
                GrantFilter::for_subject("S").with_client("c1").with_session("s2")
            )
            .await,
            vec!["b"]
        );
    }

    #[tokio::test]
    async fn test_get_all_requires_subject() {
        let h = harness();
        let err = h.store.get_all(&GrantFilter::default()).await.unwrap_err();
        assert!(err.is_invalid_argument());
        let err = h.store.remove_all(&GrantFilter::default()).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_get_all_prunes_dangling_references() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "short", "c", "t", 1))
            .await
            .unwrap();
        h.store
            .store(&make_grant(&h, "long", "c", "t", 60))
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(2));

        let filter = GrantFilter::for_subject("S").with_client("c").with_type("t");
        assert_eq!(keys_of(&h.store, filter).await, vec!["long"]);
        settle().await;

        for index in ["S", "S:c", "S:c:t"] {
            assert_eq!(
                h.kv.set_members(index).await.unwrap(),
                vec!["long".to_string()],
                "index {}",
                index
            );
        }
    }

    #[tokio::test]
    async fn test_pruning_keeps_keys_stored_again() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "k", "c", "t", 1))
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(2));

        assert!(keys_of(&h.store, GrantFilter::for_subject("S")).await.is_empty());
        // Stored again before the background prune gets to run.
        h.store
            .store(&make_grant(&h, "k", "c", "t", 60))
            .await
            .unwrap();
        settle().await;

        for index in ["S", "S:c", "S:c:t"] {
            assert_eq!(h.kv.set_members(index).await.unwrap(), vec!["k".to_string()]);
        }
        assert_eq!(keys_of(&h.store, GrantFilter::for_subject("S")).await, vec!["k"]);
    }

    #[test]
    fn test_get_all_prunes_inline_without_runtime() {
        use std::future::Future;

        let h = harness();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            h.store
                .store(&make_grant(&h, "short", "c", "t", 1))
                .await
                .unwrap();
        });
        h.clock.advance(Duration::from_secs(2));
        drop(rt);

        // Polled outside any runtime, so pruning finishes before `get_all` returns.
        let filter = GrantFilter::for_subject("S");
        let mut future = Box::pin(h.store.get_all(&filter));
        let waker = std::task::Waker::noop();
        let mut cx = std::task::Context::from_waker(waker);
        let found = match future.as_mut().poll(&mut cx) {
            std::task::Poll::Ready(found) => found.unwrap(),
            std::task::Poll::Pending => panic!("in-memory get_all should not suspend"),
        };
        assert!(found.is_empty());
        assert!(!h.kv.contains_key("S").unwrap());
        assert!(!h.kv.contains_key("S:c:t").unwrap());
    }

    #[tokio::test]
    async fn test_undecodable_record_does_not_hide_others() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "good", "c", "t", 60))
            .await
            .unwrap();
        h.kv.string_set("bad", "{not json", None).await.unwrap();
        h.kv.set_add("S", "bad").await.unwrap();

        assert_eq!(keys_of(&h.store, GrantFilter::for_subject("S")).await, vec!["good"]);
        settle().await;
        // Not treated as dangling either.
        assert!(h.kv.set_members("S").await.unwrap().contains(&"bad".to_string()));

        h.store
            .remove_all(&GrantFilter::for_subject("S"))
            .await
            .unwrap();
        assert!(h.store.get("good").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_prunes_dangling_references() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "keeper", "c", "t", 60))
            .await
            .unwrap();
        h.store
            .store(&make_grant(&h, "old", "c", "t", 1))
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(2));
        h.store
            .store(&make_grant(&h, "new", "c", "t", 60))
            .await
            .unwrap();

        let expected = vec!["keeper".to_string(), "new".to_string()];
        assert_eq!(h.kv.set_members("S").await.unwrap(), expected);
        assert_eq!(h.kv.set_members("S:c:t").await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_overwritten_grant_not_returned_under_old_client() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "k", "old-client", "t", 60))
            .await
            .unwrap();
        h.store
            .store(&make_grant(&h, "k", "new-client", "t", 60))
            .await
            .unwrap();

        assert!(keys_of(&h.store, GrantFilter::for_subject("S").with_client("old-client"))
            .await
            .is_empty());
        assert_eq!(
            keys_of(&h.store, GrantFilter::for_subject("S").with_client("new-client")).await,
            vec!["k"]
        );
    }

    #[tokio::test]
    async fn test_remove_unlinks_from_all_indexes() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "k1", "c", "t", 60))
            .await
            .unwrap();
        h.store
            .store(&make_grant(&h, "k2", "c", "t", 60))
            .await
            .unwrap();
        h.store.remove("k1").await.unwrap();

        assert!(h.store.get("k1").await.unwrap().is_none());
        for index in ["S", "S:c", "S:c:t"] {
            assert_eq!(h.kv.set_members(index).await.unwrap(), vec!["k2".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let h = harness();
        h.store.remove("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_all_by_client_keeps_other_clients() {
        let h = harness();
        for (key, client) in [("a", "c1"), ("b", "c1"), ("c", "c2")] {
            h.store
                .store(&make_grant(&h, key, client, "t1", 60))
                .await
                .unwrap();
        }
        h.store
            .remove_all(&GrantFilter::for_subject("S").with_client("c1"))
            .await
            .unwrap();

        assert_eq!(keys_of(&h.store, GrantFilter::for_subject("S")).await, vec!["c"]);
        assert!(!h.kv.contains_key("S:c1").unwrap());
        assert!(!h.kv.contains_key("S:c1:t1").unwrap());
        assert_eq!(h.kv.set_members("S").await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_all_non_matching_type_keeps_everything() {
        let h = harness();
        for i in 0..5 {
            h.store
                .store(&make_grant(&h, &format!("g{}", i), "client1", "type1", 60))
                .await
                .unwrap();
        }
        h.store
            .remove_all(
                &GrantFilter::for_subject("S")
                    .with_client("client1")
                    .with_type("type2"),
            )
            .await
            .unwrap();
        assert_eq!(keys_of(&h.store, GrantFilter::for_subject("S")).await.len(), 5);
    }

    #[tokio::test]
    async fn test_remove_all_by_type_is_narrower() {
        let h = harness();
        for i in 0..5 {
            let kind = if i < 3 { "type1" } else { "type2" };
            h.store
                .store(&make_grant(&h, &format!("g{}", i), "client1", kind, 60))
                .await
                .unwrap();
        }
        h.store
            .remove_all(
                &GrantFilter::for_subject("S")
                    .with_client("client1")
                    .with_type("type2"),
            )
            .await
            .unwrap();

        assert_eq!(
            keys_of(&h.store, GrantFilter::for_subject("S")).await,
            vec!["g0", "g1", "g2"]
        );
        assert_eq!(h.kv.set_members("S:client1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_remove_all_by_session_only_removes_that_session() {
        let h = harness();
        for i in 0..5 {
            let grant = make_grant(&h, &format!("g{}", i), "client1", "type1", 60)
                .with_session(format!("session{}", i));
            h.store.store(&grant).await.unwrap();
        }
        h.store
            .remove_all(
                &GrantFilter::for_subject("S")
                    .with_client("client1")
                    .with_session("session1"),
            )
            .await
            .unwrap();

        let remaining = keys_of(&h.store, GrantFilter::for_subject("S")).await;
        assert_eq!(remaining, vec!["g0", "g2", "g3", "g4"]);
        assert_eq!(h.kv.set_members("S:client1").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_remove_all_by_subject_clears_finer_indexes() {
        let h = harness();
        h.store
            .store(&make_grant(&h, "a", "c1", "t1", 60))
            .await
            .unwrap();
        h.store
            .store(&make_grant(&h, "b", "c2", "t2", 60))
            .await
            .unwrap();
        h.store
            .remove_all(&GrantFilter::for_subject("S"))
            .await
            .unwrap();

        assert_eq!(h.kv.key_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_all_empty_is_noop() {
        let h = harness();
        h.store
            .remove_all(&GrantFilter::for_subject("nobody").with_client("c"))
            .await
            .unwrap();
    }
}
