//! Key-value store capability.
//!
//! The grant store and caches are written against [`KeyValueStore`] only, so
//! any TTL-capable server with atomic multi-key transactions can back them.
//! Keys hold either a string or a set of strings; every key may carry a TTL
//! after which the store drops it on its own.

use std::time::Duration;

use async_trait::async_trait;
use grantvault_core::VaultResult;

/// How a [`TxOp::KeyExpire`] or [`KeyValueStore::key_expire`] applies its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpireMode {
    /// Replace whatever TTL the key has.
    #[default]
    Always,
    /// Only set the TTL when the key has none yet or a shorter one.
    ExtendOnly,
}

/// A single queued transaction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOp {
    StringSet {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    SetAdd {
        key: String,
        member: String,
    },
    SetRemove {
        key: String,
        members: Vec<String>,
    },
    KeyExpire {
        key: String,
        ttl: Duration,
        mode: ExpireMode,
    },
    KeyDelete {
        keys: Vec<String>,
    },
}

/// Builder for an all-or-nothing batch of writes.
///
/// Nothing is sent until the transaction is handed to
/// [`KeyValueStore::execute`]; concurrent readers never observe a partially
/// applied transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    ops: Vec<TxOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string_set(&mut self, key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) -> &mut Self {
        self.ops.push(TxOp::StringSet {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    pub fn set_add(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(TxOp::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Queue a removal; a no-op when `members` is empty.
    pub fn set_remove(&mut self, key: impl Into<String>, members: Vec<String>) -> &mut Self {
        if !members.is_empty() {
            self.ops.push(TxOp::SetRemove {
                key: key.into(),
                members,
            });
        }
        self
    }

    pub fn key_expire(&mut self, key: impl Into<String>, ttl: Duration, mode: ExpireMode) -> &mut Self {
        self.ops.push(TxOp::KeyExpire {
            key: key.into(),
            ttl,
            mode,
        });
        self
    }

    /// Queue a delete; a no-op when `keys` is empty.
    pub fn key_delete(&mut self, keys: Vec<String>) -> &mut Self {
        if !keys.is_empty() {
            self.ops.push(TxOp::KeyDelete { keys });
        }
        self
    }

    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<TxOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Remote, TTL-capable key-value store.
///
/// Implementations must be safe to share between tasks. Missing keys and
/// expired keys are indistinguishable: both read as absent / empty.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a string value.
    async fn string_get(&self, key: &str) -> VaultResult<Option<String>>;

    /// Write a string value, replacing any previous value and TTL.
    async fn string_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> VaultResult<()>;

    /// Read many string values in one round trip, positionally aligned with `keys`.
    async fn batch_get(&self, keys: &[String]) -> VaultResult<Vec<Option<String>>>;

    /// Add a member to a set, creating it if needed. Returns whether the member was new.
    async fn set_add(&self, key: &str, member: &str) -> VaultResult<bool>;

    /// Remove members from a set. Returns how many were present.
    async fn set_remove(&self, key: &str, members: &[String]) -> VaultResult<u64>;

    /// All members of a set; empty when the set does not exist.
    async fn set_members(&self, key: &str) -> VaultResult<Vec<String>>;

    /// Apply a TTL to an existing key. Returns whether the TTL changed.
    async fn key_expire(&self, key: &str, ttl: Duration, mode: ExpireMode) -> VaultResult<bool>;

    /// Remaining TTL, or `None` if the key is missing or has no TTL.
    async fn key_time_to_live(&self, key: &str) -> VaultResult<Option<Duration>>;

    /// Delete keys of any kind. Returns how many existed.
    async fn key_delete(&self, keys: &[String]) -> VaultResult<u64>;

    /// Run a transaction atomically. Returns `false` if the store declined
    /// to commit it, in which case none of its operations were applied.
    async fn execute(&self, transaction: Transaction) -> VaultResult<bool>;
}
