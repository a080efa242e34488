//! In-memory key-value store.
//!
//! Reference implementation of [`KeyValueStore`] with per-key TTLs driven by
//! an injected [`Clock`]. Reads treat expired keys as absent. Every write
//! first reclaims the keys whose deadline has passed, using a deadline queue
//! ordered by expiry, so expired data never accumulates.
//!
//! # Thread Safety
//!
//! All state sits behind one `RwLock`. A transaction records the previous
//! state of each key it touches and restores those keys if any operation
//! fails, so a failing transaction leaves the store untouched.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use grantvault_core::{Clock, StorageError, SystemClock, Timestamp, VaultResult};

use crate::kv::{ExpireMode, KeyValueStore, Transaction, TxOp};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Timestamp>,
}

impl Entry {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Previous state of every key a transaction touched.
type UndoLog = HashMap<String, Option<Entry>>;

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<String, Entry>,
    /// Pending deadlines. An item is stale once its key got a new deadline
    /// or was deleted; reaping skips those.
    deadlines: BTreeSet<(Timestamp, String)>,
}

/// TTL-aware in-memory store.
#[derive(Debug)]
pub struct InMemoryKeyValueStore {
    table: RwLock<Table>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKeyValueStore {
    /// Store driven by the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store driven by the given clock, typically a `ManualClock` in tests.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            clock,
        }
    }

    /// Number of keys that have not expired.
    pub fn key_count(&self) -> VaultResult<usize> {
        let now = self.clock.now();
        Ok(self.read()?.entries.values().filter(|e| e.is_live(now)).count())
    }

    /// Whether a live key exists.
    pub fn contains_key(&self, key: &str) -> VaultResult<bool> {
        let now = self.clock.now();
        Ok(self.read()?.live(key, now).is_some())
    }

    /// Drop every expired key now instead of on the next write.
    /// Returns how many keys were reclaimed.
    pub fn reap_expired(&self) -> VaultResult<usize> {
        let now = self.clock.now();
        Ok(self.write()?.reap(now))
    }

    fn read(&self) -> VaultResult<RwLockReadGuard<'_, Table>> {
        self.table
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    /// Write access with expired keys already reclaimed.
    fn write_at(&self, now: Timestamp) -> VaultResult<RwLockWriteGuard<'_, Table>> {
        let mut table = self.write()?;
        let reaped = table.reap(now);
        if reaped > 0 {
            tracing::trace!(reaped, "reclaimed expired keys");
        }
        Ok(table)
    }

    fn write(&self) -> VaultResult<RwLockWriteGuard<'_, Table>> {
        self.table
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

fn wrong_type(key: &str) -> StorageError {
    StorageError::WrongType {
        key: key.to_string(),
    }
}

fn deadline(now: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(Timestamp::MAX_UTC)
}

impl Table {
    fn live(&self, key: &str, now: Timestamp) -> Option<&Entry> {
        self.entries.get(key).filter(|e| e.is_live(now))
    }

    /// Remove every key whose deadline is at or before `now`.
    fn reap(&mut self, now: Timestamp) -> usize {
        let mut reaped = 0;
        while self.deadlines.first().is_some_and(|(at, _)| *at <= now) {
            let Some((at, key)) = self.deadlines.pop_first() else {
                break;
            };
            if self.entries.get(&key).is_some_and(|e| e.expires_at == Some(at)) {
                self.entries.remove(&key);
                reaped += 1;
            }
        }
        reaped
    }

    fn purge(&mut self, key: &str, now: Timestamp) {
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
    }

    fn insert(&mut self, key: String, entry: Entry) {
        if let Some(at) = entry.expires_at {
            self.deadlines.insert((at, key.clone()));
        }
        self.entries.insert(key, entry);
    }

    fn get_string(&self, key: &str, now: Timestamp) -> Result<Option<String>, StorageError> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn apply(&mut self, op: TxOp, now: Timestamp) -> Result<(), StorageError> {
        match op {
            TxOp::StringSet { key, value, ttl } => {
                let expires_at = ttl.map(|ttl| deadline(now, ttl));
                self.insert(
                    key,
                    Entry {
                        value: Value::Str(value),
                        expires_at,
                    },
                );
            }
            TxOp::SetAdd { key, member } => {
                self.set_add(&key, member, now)?;
            }
            TxOp::SetRemove { key, members } => {
                self.set_remove(&key, &members, now)?;
            }
            TxOp::KeyExpire { key, ttl, mode } => {
                self.key_expire(&key, ttl, mode, now);
            }
            TxOp::KeyDelete { keys } => {
                self.key_delete(&keys, now);
            }
        }
        Ok(())
    }

    fn set_add(&mut self, key: &str, member: String, now: Timestamp) -> Result<bool, StorageError> {
        self.purge(key, now);
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(members) => Ok(members.insert(member)),
            Value::Str(_) => Err(wrong_type(key)),
        }
    }

    fn set_remove(&mut self, key: &str, members: &[String], now: Timestamp) -> Result<u64, StorageError> {
        self.purge(key, now);
        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(0);
        };
        let Value::Set(set) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        let removed = members.iter().filter(|m| set.remove(m.as_str())).count() as u64;
        if set.is_empty() {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    fn key_expire(&mut self, key: &str, ttl: Duration, mode: ExpireMode, now: Timestamp) -> bool {
        self.purge(key, now);
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        let new_deadline = deadline(now, ttl);
        let apply = match (mode, entry.expires_at) {
            (ExpireMode::Always, _) | (ExpireMode::ExtendOnly, None) => true,
            (ExpireMode::ExtendOnly, Some(current)) => new_deadline > current,
        };
        if apply {
            entry.expires_at = Some(new_deadline);
            self.deadlines.insert((new_deadline, key.to_string()));
        }
        apply
    }

    fn key_delete(&mut self, keys: &[String], now: Timestamp) -> u64 {
        keys.iter()
            .filter_map(|k| self.entries.remove(k))
            .filter(|e| e.is_live(now))
            .count() as u64
    }

    /// Record the current state of the keys `op` is about to touch.
    fn record(&self, op: &TxOp, undo: &mut UndoLog) {
        let keys: &[String] = match op {
            TxOp::StringSet { key, .. }
            | TxOp::SetAdd { key, .. }
            | TxOp::SetRemove { key, .. }
            | TxOp::KeyExpire { key, .. } => std::slice::from_ref(key),
            TxOp::KeyDelete { keys } => keys,
        };
        for key in keys {
            undo.entry(key.clone())
                .or_insert_with(|| self.entries.get(key).cloned());
        }
    }

    fn rollback(&mut self, undo: UndoLog) {
        for (key, previous) in undo {
            match previous {
                Some(entry) => self.insert(key, entry),
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn string_get(&self, key: &str) -> VaultResult<Option<String>> {
        let now = self.clock.now();
        Ok(self.read()?.get_string(key, now)?)
    }

    async fn string_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> VaultResult<()> {
        let now = self.clock.now();
        let op = TxOp::StringSet {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        };
        Ok(self.write_at(now)?.apply(op, now)?)
    }

    async fn batch_get(&self, keys: &[String]) -> VaultResult<Vec<Option<String>>> {
        let now = self.clock.now();
        let table = self.read()?;
        // Non-string keys read as absent in a batch, like MGET.
        Ok(keys
            .iter()
            .map(|k| table.get_string(k, now).ok().flatten())
            .collect())
    }

    async fn set_add(&self, key: &str, member: &str) -> VaultResult<bool> {
        let now = self.clock.now();
        Ok(self.write_at(now)?.set_add(key, member.to_string(), now)?)
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> VaultResult<u64> {
        let now = self.clock.now();
        Ok(self.write_at(now)?.set_remove(key, members, now)?)
    }

    async fn set_members(&self, key: &str) -> VaultResult<Vec<String>> {
        let now = self.clock.now();
        match self.read()?.live(key, now) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key).into()),
        }
    }

    async fn key_expire(&self, key: &str, ttl: Duration, mode: ExpireMode) -> VaultResult<bool> {
        let now = self.clock.now();
        Ok(self.write_at(now)?.key_expire(key, ttl, mode, now))
    }

    async fn key_time_to_live(&self, key: &str) -> VaultResult<Option<Duration>> {
        let now = self.clock.now();
        Ok(self
            .read()?
            .live(key, now)
            .and_then(|e| e.expires_at)
            .map(|at| at.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO)))
    }

    async fn key_delete(&self, keys: &[String]) -> VaultResult<u64> {
        let now = self.clock.now();
        Ok(self.write_at(now)?.key_delete(keys, now))
    }

    async fn execute(&self, transaction: Transaction) -> VaultResult<bool> {
        let now = self.clock.now();
        let mut table = self.write_at(now)?;
        let mut undo = UndoLog::new();
        for op in transaction.into_ops() {
            table.record(&op, &mut undo);
            if let Err(e) = table.apply(op, now) {
                table.rollback(undo);
                return Err(StorageError::TransactionFailed {
                    reason: e.to_string(),
                }
                .into());
            }
        }
        Ok(true)
    }
}
