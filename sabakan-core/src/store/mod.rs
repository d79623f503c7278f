//! Storage port (spec.md §4.2, component B) — implemented by
//! `sabakan-store-etcd`. Core logic depends only on this trait, never on
//! an etcd client directly.

pub mod keys;
pub mod mock;

use async_trait::async_trait;

use crate::error::Result;

/// A single key/value pair as observed at some store revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: i64,
}

/// A guard for a transaction: the key must be at `expected_revision` (or
/// absent, when `expected_revision` is `None`) for the transaction to apply.
#[derive(Debug, Clone)]
pub struct Guard {
    pub key: String,
    pub expected_revision: Option<i64>,
}

impl Guard {
    pub fn absent(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expected_revision: None,
        }
    }

    pub fn at_revision(key: impl Into<String>, revision: i64) -> Self {
        Self {
            key: key.into(),
            expected_revision: Some(revision),
        }
    }
}

/// A single write inside a transaction's `then`/`or_else` branch.
#[derive(Debug, Clone)]
pub enum Op {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl Op {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// What changed at a watched key.
#[derive(Debug, Clone)]
pub enum WatchEventKind {
    Put,
    Delete,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: String,
    pub value: Option<Vec<u8>>,
    pub revision: i64,
}

/// Opaque lease handle; keys written under a lease vanish on lease expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseId(pub i64);

/// A gap-free stream of [`WatchEvent`]s starting from the requested
/// revision. Boxed so the trait stays object-safe across backends.
pub type WatchStream = std::pin::Pin<Box<dyn futures::Stream<Item = Result<WatchEvent>> + Send>>;

/// Typed wrapper over a transactional, watchable KV store (spec.md §4.2).
/// This is the single seam in the whole crate: only `sabakan-store-etcd`
/// (or, in tests, [`mock::MemStore`]) implements it.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<i64>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>>;

    /// Atomic compare-and-swap: applies `then` if every guard holds,
    /// otherwise applies `or_else`. Returns whether `then` was applied.
    async fn txn(&self, guards: Vec<Guard>, then: Vec<Op>, or_else: Vec<Op>) -> Result<bool>;

    /// Current store revision, used to seed a watch with no gap.
    async fn current_revision(&self) -> Result<i64>;

    /// Gap-free event stream starting at `from_revision`.
    async fn watch_from(&self, prefix: &str, from_revision: i64) -> Result<WatchStream>;

    /// Grants a lease with the given TTL; keys put under it vanish on expiry.
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId>;
}
