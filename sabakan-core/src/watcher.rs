//! Cache and watcher task (spec.md §4.3, component C).
//!
//! Seeds the in-memory caches from a full scan, then applies a gap-free
//! watch stream forever. Readers never touch the store directly.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;

use crate::cache::Caches;
use crate::error::Result;
use crate::ipam::RackIndexSet;
use crate::store::{keys, Store, WatchEvent, WatchEventKind};
use crate::types::{DhcpConfig, IpamConfig, Machine};

/// A coalescing readiness signal: repeated updates between a reader's
/// polls collapse into one wakeup, the same drop-if-full shape used by
/// other `tokio::sync::watch`-based readiness signals in this stack.
pub fn readiness_channel() -> (watch::Sender<u64>, watch::Receiver<u64>) {
    watch::channel(0)
}

pub struct Watcher {
    store: Arc<dyn Store>,
    prefix: String,
    caches: Arc<Caches>,
    ready_tx: watch::Sender<u64>,
}

impl Watcher {
    pub fn new(
        store: Arc<dyn Store>,
        prefix: String,
        caches: Arc<Caches>,
        ready_tx: watch::Sender<u64>,
    ) -> Self {
        Self {
            store,
            prefix,
            caches,
            ready_tx,
        }
    }

    async fn seed(&self) -> Result<i64> {
        if let Some(kv) = self.store.get(&keys::ipam(&self.prefix)).await? {
            if let Ok(config) = serde_json::from_slice::<IpamConfig>(&kv.value) {
                self.caches.ipam.set(config).await;
            }
        }
        if let Some(kv) = self.store.get(&keys::dhcp(&self.prefix)).await? {
            if let Ok(config) = serde_json::from_slice::<DhcpConfig>(&kv.value) {
                self.caches.dhcp.set(config).await;
            }
        }
        for kv in self
            .store
            .scan_prefix(&keys::machines_prefix(&self.prefix))
            .await?
        {
            if let Ok(machine) = serde_json::from_slice::<Machine>(&kv.value) {
                self.caches.machines.put(machine).await;
            }
        }
        let rack_prefix = self.rack_index_prefix();
        for kv in self.store.scan_prefix(&rack_prefix).await? {
            if let Some((rack, set)) = self.parse_rack_index(&kv.key, &kv.value) {
                self.caches.rack_indices.set(rack, set).await;
            }
        }
        self.store.current_revision().await
    }

    fn rack_index_prefix(&self) -> String {
        format!("{}/rack-indices/", self.prefix)
    }

    fn parse_rack_index(&self, key: &str, value: &[u8]) -> Option<(u32, RackIndexSet)> {
        let rack_str = key.strip_prefix(&self.rack_index_prefix())?;
        let rack = rack_str.parse::<u32>().ok()?;
        let set = serde_json::from_slice::<RackIndexSet>(value).ok()?;
        Some((rack, set))
    }

    /// Seeds the caches, signals readiness once, then applies every
    /// subsequent event forever. A stream error (e.g. the underlying
    /// backend compacted past our revision) is fatal: the caller should
    /// drop this `Watcher` and build a fresh one, since resuming a
    /// stream that already skipped history would leave the caches
    /// silently wrong rather than obviously down.
    pub async fn run(self) -> Result<()> {
        let from_revision = self.seed().await?;
        self.ready_tx.send_modify(|r| *r = r.wrapping_add(1));

        let mut stream = self.store.watch_from(&self.prefix, from_revision + 1).await?;
        while let Some(event) = stream.next().await {
            self.apply(event?).await;
            self.ready_tx.send_modify(|r| *r = r.wrapping_add(1));
        }
        Ok(())
    }

    async fn apply(&self, event: WatchEvent) {
        let machines_prefix = keys::machines_prefix(&self.prefix);

        if event.key == keys::ipam(&self.prefix) {
            self.apply_config(&self.caches.ipam, &event).await;
        } else if event.key == keys::dhcp(&self.prefix) {
            self.apply_config(&self.caches.dhcp, &event).await;
        } else if let Some(serial) = event.key.strip_prefix(&machines_prefix) {
            match (&event.kind, &event.value) {
                (WatchEventKind::Put, Some(value)) => {
                    if let Ok(machine) = serde_json::from_slice::<Machine>(value) {
                        self.caches.machines.put(machine).await;
                    }
                }
                (WatchEventKind::Delete, _) => self.caches.machines.remove(serial).await,
                _ => {}
            }
        } else if let Some(rack) = event
            .key
            .strip_prefix(&self.rack_index_prefix())
            .and_then(|s| s.parse::<u32>().ok())
        {
            match (&event.kind, &event.value) {
                (WatchEventKind::Put, Some(value)) => {
                    if let Ok(set) = serde_json::from_slice::<RackIndexSet>(value) {
                        self.caches.rack_indices.set(rack, set).await;
                    }
                }
                (WatchEventKind::Delete, _) => self.caches.rack_indices.remove(rack).await,
                _ => {}
            }
        }
    }

    async fn apply_config<T>(&self, cache: &crate::cache::ConfigCache<T>, event: &WatchEvent)
    where
        T: serde::de::DeserializeOwned,
    {
        match (&event.kind, &event.value) {
            (WatchEventKind::Put, Some(value)) => {
                if let Ok(config) = serde_json::from_slice::<T>(value) {
                    cache.set(config).await;
                }
            }
            (WatchEventKind::Delete, _) => cache.clear().await,
            _ => {}
        }
    }
}
