//! Query engine (spec.md §4.8, component H): in-memory predicate
//! matching against the machine cache. Every field is optional — an
//! all-`None` query matches everything.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::MachineCache;
use crate::lifecycle::MachineState;
use crate::types::Machine;

/// A conjunctive predicate over the machine cache (spec.md §4.5 Query).
/// Every field is optional; an all-`None`/empty query matches everything.
#[derive(Debug, Clone, Default)]
pub struct MachineQuery {
    pub serial: Option<String>,
    pub product: Option<String>,
    pub datacenter: Option<String>,
    pub rack: Option<u32>,
    pub role: Option<String>,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub bmc_type: Option<String>,
    pub state: Option<MachineState>,
    /// Subset match: every `(key, value)` pair here must be present,
    /// with that exact value, on the machine's labels.
    pub labels: BTreeMap<String, String>,
    /// Exclusion match: a machine is rejected if any `(key, value)` pair
    /// here is present, with that exact value, on its labels.
    pub without_labels: BTreeMap<String, String>,
}

impl MachineQuery {
    pub fn matches(&self, machine: &Machine) -> bool {
        if let Some(serial) = &self.serial {
            if &machine.serial != serial {
                return false;
            }
        }
        if let Some(product) = &self.product {
            if &machine.product != product {
                return false;
            }
        }
        if let Some(dc) = &self.datacenter {
            if &machine.datacenter != dc {
                return false;
            }
        }
        if let Some(rack) = self.rack {
            if machine.rack != rack {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if &machine.role != role {
                return false;
            }
        }
        if let Some(ipv4) = &self.ipv4 {
            if !machine.ipv4.iter().any(|a| a == ipv4) {
                return false;
            }
        }
        if let Some(ipv6) = &self.ipv6 {
            if !machine.ipv6.iter().any(|a| a == ipv6) {
                return false;
            }
        }
        if let Some(bmc_type) = &self.bmc_type {
            if &machine.bmc.bmc_type != bmc_type {
                return false;
            }
        }
        if let Some(state) = self.state {
            if machine.status.state != state {
                return false;
            }
        }
        for (k, v) in &self.labels {
            if machine.labels.get(k).map(|got| got == v) != Some(true) {
                return false;
            }
        }
        for (k, v) in &self.without_labels {
            if machine.labels.get(k).map(|got| got == v) == Some(true) {
                return false;
            }
        }
        true
    }
}

/// Runs `query` against the current machine cache snapshot.
pub async fn run(cache: &MachineCache, query: &MachineQuery) -> Vec<Arc<Machine>> {
    cache
        .snapshot()
        .await
        .into_iter()
        .filter(|m| query.matches(m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Status;
    use crate::types::MachineBmc;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn machine(serial: &str, rack: u32, role: &str, state: MachineState) -> Machine {
        let mut labels = BTreeMap::new();
        labels.insert("env".to_string(), "prod".to_string());
        Machine {
            serial: serial.into(),
            product: "R640".into(),
            datacenter: "dc1".into(),
            rack,
            index_in_rack: 0,
            role: role.into(),
            ipv4: vec!["10.69.0.3".into()],
            ipv6: vec![],
            bmc: MachineBmc {
                ipv4: "10.72.16.3".into(),
                ipv6: String::new(),
                bmc_type: "iDRAC-9".into(),
            },
            labels,
            register_date: Utc::now(),
            retire_date: None,
            status: Status::new(state, Utc::now()),
        }
    }

    #[tokio::test]
    async fn empty_query_matches_everything() {
        let cache = MachineCache::default();
        cache.put(machine("s1", 0, "worker", MachineState::Healthy)).await;
        cache.put(machine("s2", 1, "boot", MachineState::Retired)).await;
        let results = run(&cache, &MachineQuery::default()).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn filters_combine_with_and_semantics() {
        let cache = MachineCache::default();
        cache.put(machine("s1", 0, "worker", MachineState::Healthy)).await;
        cache.put(machine("s2", 0, "boot", MachineState::Healthy)).await;

        let q = MachineQuery {
            rack: Some(0),
            role: Some("worker".into()),
            ..Default::default()
        };
        let results = run(&cache, &q).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].serial, "s1");
    }

    #[tokio::test]
    async fn label_filter_matches_key_value_pair() {
        let cache = MachineCache::default();
        cache.put(machine("s1", 0, "worker", MachineState::Healthy)).await;
        let q = MachineQuery {
            labels: BTreeMap::from([("env".into(), "staging".into())]),
            ..Default::default()
        };
        assert!(run(&cache, &q).await.is_empty());

        let q = MachineQuery {
            labels: BTreeMap::from([("env".into(), "prod".into())]),
            ..Default::default()
        };
        assert_eq!(run(&cache, &q).await.len(), 1);
    }

    #[tokio::test]
    async fn without_labels_excludes_matching_machines() {
        let cache = MachineCache::default();
        cache.put(machine("s1", 0, "worker", MachineState::Healthy)).await;
        cache.put(machine("s2", 1, "boot", MachineState::Retired)).await;

        let q = MachineQuery {
            without_labels: BTreeMap::from([("env".into(), "prod".into())]),
            ..Default::default()
        };
        assert!(run(&cache, &q).await.is_empty());
    }

    #[tokio::test]
    async fn labels_subset_match_requires_all_pairs() {
        let cache = MachineCache::default();
        cache.put(machine("s1", 0, "worker", MachineState::Healthy)).await;

        let q = MachineQuery {
            labels: BTreeMap::from([
                ("env".into(), "prod".into()),
                ("rack-tier".into(), "a".into()),
            ]),
            ..Default::default()
        };
        assert!(run(&cache, &q).await.is_empty());
    }
}
