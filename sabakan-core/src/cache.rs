//! In-memory read cache kept current by [`crate::watcher`] (component C).
//!
//! All reads in the REST frontend and in [`crate::query`] go through
//! here rather than the store directly — the whole point of the
//! watcher is that reads never wait on the network.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::ipam::RackIndexSet;
use crate::types::{DhcpConfig, IpamConfig, Machine};

/// Holds the last-seen value of a singleton config key.
#[derive(Default)]
pub struct ConfigCache<T> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T> ConfigCache<T> {
    pub async fn get(&self) -> Option<Arc<T>> {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, value: T) {
        *self.inner.write().await = Some(Arc::new(value));
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

/// Holds the full machine set, keyed by serial.
#[derive(Default)]
pub struct MachineCache {
    inner: RwLock<BTreeMap<String, Arc<Machine>>>,
}

impl MachineCache {
    pub async fn get(&self, serial: &str) -> Option<Arc<Machine>> {
        self.inner.read().await.get(serial).cloned()
    }

    pub async fn put(&self, machine: Machine) {
        self.inner
            .write()
            .await
            .insert(machine.serial.clone(), Arc::new(machine));
    }

    pub async fn remove(&self, serial: &str) {
        self.inner.write().await.remove(serial);
    }

    pub async fn snapshot(&self) -> Vec<Arc<Machine>> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// Rack-index allocation cache, keyed by rack number. Used by the REST
/// frontend's read path only — [`crate::ipam::registration`] always
/// re-reads the authoritative copy from the store before committing.
#[derive(Default)]
pub struct RackIndexCache {
    inner: RwLock<BTreeMap<u32, Arc<RackIndexSet>>>,
}

impl RackIndexCache {
    pub async fn get(&self, rack: u32) -> Option<Arc<RackIndexSet>> {
        self.inner.read().await.get(&rack).cloned()
    }

    pub async fn set(&self, rack: u32, set: RackIndexSet) {
        self.inner.write().await.insert(rack, Arc::new(set));
    }

    pub async fn remove(&self, rack: u32) {
        self.inner.write().await.remove(&rack);
    }
}

/// The full set of caches the watcher keeps current.
#[derive(Default)]
pub struct Caches {
    pub ipam: ConfigCache<IpamConfig>,
    pub dhcp: ConfigCache<DhcpConfig>,
    pub machines: MachineCache,
    pub rack_indices: RackIndexCache,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{MachineState, Status};
    use crate::types::MachineBmc;
    use chrono::Utc;

    fn machine(serial: &str) -> Machine {
        Machine {
            serial: serial.into(),
            product: String::new(),
            datacenter: String::new(),
            rack: 0,
            index_in_rack: 0,
            role: "worker".into(),
            ipv4: vec![],
            ipv6: vec![],
            bmc: MachineBmc::default(),
            labels: Default::default(),
            register_date: Utc::now(),
            retire_date: None,
            status: Status::new(MachineState::Uninitialized, Utc::now()),
        }
    }

    #[tokio::test]
    async fn put_get_remove_roundtrip() {
        let cache = MachineCache::default();
        cache.put(machine("s1")).await;
        assert!(cache.get("s1").await.is_some());
        cache.remove("s1").await;
        assert!(cache.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn config_cache_starts_empty() {
        let cache: ConfigCache<IpamConfig> = ConfigCache::default();
        assert!(cache.get().await.is_none());
    }
}
