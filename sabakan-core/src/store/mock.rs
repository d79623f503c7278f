//! In-memory [`Store`] implementation for tests.
//!
//! Grounded on the revisioned-KV-plus-watcher-registry shape used by
//! real in-memory etcd-alike stores (revision counter, append-only event
//! log for replay, broadcast fan-out for live tails). Not meant for
//! production use — `sabakan-store-etcd::EtcdStore` is the real backend.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{Result, SabakanError};
use crate::store::{Guard, KeyValue, LeaseId, Op, Store, WatchEvent, WatchEventKind, WatchStream};

struct Inner {
    entries: BTreeMap<String, (Vec<u8>, i64)>,
    revision: i64,
    history: Vec<WatchEvent>,
    next_lease: i64,
}

/// An in-process, single-node [`Store`]. Leases are tracked but never
/// expire — tests that need lease-expiry semantics simulate it by
/// calling [`MemStore::delete`] directly.
pub struct MemStore {
    inner: Mutex<Inner>,
    tx: broadcast::Sender<WatchEvent>,
}

impl Default for MemStore {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                revision: 0,
                history: Vec::new(),
                next_lease: 1,
            }),
            tx,
        }
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_guards(inner: &Inner, guards: &[Guard]) -> bool {
        guards.iter().all(|g| {
            let actual = inner.entries.get(&g.key).map(|(_, rev)| *rev);
            actual == g.expected_revision
        })
    }

    fn apply_ops(inner: &mut Inner, ops: &[Op]) -> Vec<WatchEvent> {
        let mut events = Vec::with_capacity(ops.len());
        for op in ops {
            inner.revision += 1;
            let rev = inner.revision;
            match op {
                Op::Put { key, value } => {
                    inner.entries.insert(key.clone(), (value.clone(), rev));
                    events.push(WatchEvent {
                        kind: WatchEventKind::Put,
                        key: key.clone(),
                        value: Some(value.clone()),
                        revision: rev,
                    });
                }
                Op::Delete { key } => {
                    inner.entries.remove(key);
                    events.push(WatchEvent {
                        kind: WatchEventKind::Delete,
                        key: key.clone(),
                        value: None,
                        revision: rev,
                    });
                }
            }
        }
        inner.history.extend(events.clone());
        events
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.entries.get(key).map(|(value, revision)| KeyValue {
            key: key.to_string(),
            value: value.clone(),
            revision: *revision,
        }))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let events = Self::apply_ops(&mut inner, &[Op::put(key, value)]);
        let rev = events[0].revision;
        for ev in events {
            let _ = self.tx.send(ev);
        }
        Ok(rev)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let events = Self::apply_ops(&mut inner, &[Op::delete(key)]);
        for ev in events {
            let _ = self.tx.send(ev);
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, (v, rev))| KeyValue {
                key: k.clone(),
                value: v.clone(),
                revision: *rev,
            })
            .collect())
    }

    async fn txn(&self, guards: Vec<Guard>, then: Vec<Op>, or_else: Vec<Op>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let applied = Self::apply_guards(&inner, &guards);
        let ops = if applied { &then } else { &or_else };
        let events = Self::apply_ops(&mut inner, ops);
        drop(inner);
        for ev in events {
            let _ = self.tx.send(ev);
        }
        Ok(applied)
    }

    async fn current_revision(&self) -> Result<i64> {
        Ok(self.inner.lock().unwrap().revision)
    }

    async fn watch_from(&self, prefix: &str, from_revision: i64) -> Result<WatchStream> {
        let prefix = prefix.to_string();
        let (replay, live_rx) = {
            let inner = self.inner.lock().unwrap();
            let replay: Vec<WatchEvent> = inner
                .history
                .iter()
                .filter(|ev| ev.revision >= from_revision && ev.key.starts_with(&prefix))
                .cloned()
                .collect();
            (replay, self.tx.subscribe())
        };

        let prefix_for_live = prefix.clone();
        let live = BroadcastStream::new(live_rx).filter_map(move |res| {
            let prefix = prefix_for_live.clone();
            async move {
                match res {
                    Ok(ev) if ev.key.starts_with(&prefix) => Some(Ok(ev)),
                    Ok(_) => None,
                    Err(_) => Some(Err(SabakanError::Store(anyhow::anyhow!(
                        "watch stream lagged"
                    )))),
                }
            }
        });

        let combined = stream::iter(replay.into_iter().map(Ok)).chain(live);
        Ok(Box::pin(combined))
    }

    async fn grant_lease(&self, _ttl_secs: i64) -> Result<LeaseId> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_lease;
        inner.next_lease += 1;
        Ok(LeaseId(id))
    }
}
