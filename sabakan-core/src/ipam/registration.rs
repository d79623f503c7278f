//! Machine registration (spec.md §4.4, component D).

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SabakanError};
use crate::ipam::address::{bmc_ipv4, node_ipv4, node_ipv6};
use crate::lifecycle::{MachineState, Status};
use crate::store::{keys, Guard, Op, Store};
use crate::types::{IpamConfig, Machine, MachineBmc};

/// Allocation record for one rack: which `index-in-rack` values are taken.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RackIndexSet {
    pub used: BTreeSet<u32>,
}

/// Bounded retry budget for the registration CAS loop (spec.md §4.4).
const MAX_REGISTER_ATTEMPTS: usize = 5;

/// The role that occupies the dedicated `NodeIndexOffset` slot in every
/// rack (spec.md §4.4 step 4, glossary "boot server").
pub const ROLE_BOOT: &str = "boot";

/// Assigns the `index-in-rack` for one incoming machine, per spec.md
/// §4.4 step 4: `boot` always takes the dedicated `NodeIndexOffset`
/// slot (one per rack — already-taken is a conflict, not exhaustion);
/// every other role takes the lowest free index in
/// `[NodeIndexOffset + 1, NodeIndexOffset + MaxNodesInRack)`.
fn assign_index(config: &IpamConfig, set: &RackIndexSet, role: &str) -> Result<u32> {
    if role == ROLE_BOOT {
        if set.used.contains(&config.node_index_offset) {
            return Err(SabakanError::Conflicted);
        }
        return Ok(config.node_index_offset);
    }

    let lo = config.node_index_offset + 1;
    let hi = config.node_index_offset + config.max_nodes_in_rack;
    (lo..hi)
        .find(|i| !set.used.contains(i))
        .ok_or(SabakanError::RackFull)
}

/// One machine as presented to [`register`], before addresses or status
/// are computed.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub serial: String,
    pub product: String,
    pub datacenter: String,
    pub rack: u32,
    pub role: String,
    pub bmc_type: String,
    pub labels: BTreeMap<String, String>,
}

/// Stores the singleton IPAM config. Rejected once any machine exists —
/// the address scheme must not change under machines already placed by it.
pub async fn put_ipam_config(store: &dyn Store, prefix: &str, config: &IpamConfig) -> Result<()> {
    let machines = store.scan_prefix(&keys::machines_prefix(prefix)).await?;
    if !machines.is_empty() {
        return Err(SabakanError::MachinesExist);
    }
    let value = serde_json::to_vec(config).map_err(|e| SabakanError::Store(e.into()))?;
    store.put(&keys::ipam(prefix), value).await?;
    Ok(())
}

async fn load_ipam_config(store: &dyn Store, prefix: &str) -> Result<(IpamConfig, Option<i64>)> {
    match store.get(&keys::ipam(prefix)).await? {
        Some(kv) => {
            let config: IpamConfig =
                serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into()))?;
            Ok((config, Some(kv.revision)))
        }
        None => Err(SabakanError::IpamNotConfigured),
    }
}

async fn load_rack_index(
    store: &dyn Store,
    prefix: &str,
    rack: u32,
) -> Result<(RackIndexSet, Option<i64>)> {
    match store.get(&keys::rack_index(prefix, rack)).await? {
        Some(kv) => {
            let set: RackIndexSet =
                serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into()))?;
            Ok((set, Some(kv.revision)))
        }
        None => Ok((RackIndexSet::default(), None)),
    }
}

/// Registers a batch of machines in a single transaction (spec.md §4.4):
/// reads the IPAM config and the rack-index allocation record for every
/// rack touched, assigns the lowest free `index-in-rack` per machine,
/// derives addresses, and commits guarded on every key read. Retries up
/// to [`MAX_REGISTER_ATTEMPTS`] times on a lost race before giving up.
pub async fn register(
    store: &dyn Store,
    prefix: &str,
    requests: Vec<RegistrationRequest>,
) -> Result<Vec<Machine>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let mut seen_serials = HashSet::new();
    for r in &requests {
        if r.serial.is_empty() {
            return Err(SabakanError::BadRequest("serial must not be empty".into()));
        }
        if !seen_serials.insert(r.serial.clone()) {
            return Err(SabakanError::BadRequest(format!(
                "duplicate serial in request: {}",
                r.serial
            )));
        }
        if !crate::types::is_valid_role(&r.role) {
            return Err(SabakanError::BadRequest(format!(
                "invalid role: {}",
                r.role
            )));
        }
    }

    for attempt in 0..MAX_REGISTER_ATTEMPTS {
        let (config, ipam_rev) = load_ipam_config(store, prefix).await?;

        let racks: BTreeSet<u32> = requests.iter().map(|r| r.rack).collect();
        let mut working_sets = BTreeMap::new();
        let mut guards = Vec::new();
        if let Some(rev) = ipam_rev {
            guards.push(Guard::at_revision(keys::ipam(prefix), rev));
        }
        for rack in racks {
            let (set, rev) = load_rack_index(store, prefix, rack).await?;
            match rev {
                Some(rev) => guards.push(Guard::at_revision(keys::rack_index(prefix, rack), rev)),
                None => guards.push(Guard::absent(keys::rack_index(prefix, rack))),
            }
            working_sets.insert(rack, set);
        }

        let mut ops = Vec::new();
        let mut machines = Vec::new();
        let now = Utc::now();
        let mut conflict: Option<SabakanError> = None;

        for req in &requests {
            guards.push(Guard::absent(keys::machine(prefix, &req.serial)));

            let set = working_sets.get_mut(&req.rack).expect("rack preloaded above");
            let index_in_rack = match assign_index(&config, set, &req.role) {
                Ok(i) => i,
                Err(err) => {
                    conflict = Some(err);
                    break;
                }
            };
            set.used.insert(index_in_rack);

            let mut ipv4 = Vec::with_capacity(config.node_ip_per_node as usize);
            let mut ipv6 = Vec::new();
            for nic in 0..config.node_ip_per_node {
                ipv4.push(node_ipv4(&config, req.rack, index_in_rack, nic)?.to_string());
                if let Some(addr) = node_ipv6(&config, req.rack, index_in_rack, nic)? {
                    ipv6.push(addr.to_string());
                }
            }
            let bmc_ip = bmc_ipv4(&config, req.rack, index_in_rack)?;

            let machine = Machine {
                serial: req.serial.clone(),
                product: req.product.clone(),
                datacenter: req.datacenter.clone(),
                rack: req.rack,
                index_in_rack,
                role: req.role.clone(),
                ipv4,
                ipv6,
                bmc: MachineBmc {
                    ipv4: bmc_ip.to_string(),
                    ipv6: String::new(),
                    bmc_type: req.bmc_type.clone(),
                },
                labels: req.labels.clone(),
                register_date: now,
                retire_date: None,
                status: Status::new(MachineState::Uninitialized, now),
            };

            let value = serde_json::to_vec(&machine).map_err(|e| SabakanError::Store(e.into()))?;
            ops.push(Op::put(keys::machine(prefix, &machine.serial), value));
            machines.push(machine);
        }

        if let Some(err) = conflict {
            return Err(err);
        }

        for (rack, set) in &working_sets {
            let value = serde_json::to_vec(set).map_err(|e| SabakanError::Store(e.into()))?;
            ops.push(Op::put(keys::rack_index(prefix, *rack), value));
        }

        let applied = store.txn(guards, ops, Vec::new()).await?;
        if applied {
            return Ok(machines);
        }
        tracing::debug!(attempt, "register: lost compare-and-swap race, retrying");
    }

    Err(SabakanError::Conflicted)
}

/// Deletes a machine. Only legal once retired and with no remaining
/// encryption keys (spec.md §4.4, §4.6).
pub async fn delete_machine(store: &dyn Store, prefix: &str, serial: &str) -> Result<()> {
    let kv = store
        .get(&keys::machine(prefix, serial))
        .await?
        .ok_or(SabakanError::NotFound)?;
    let machine: Machine =
        serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into()))?;

    if machine.status.state != MachineState::Retired {
        return Err(SabakanError::MachineIsNotRetired);
    }

    let crypts = store
        .scan_prefix(&keys::crypts_prefix(prefix, serial))
        .await?;
    if !crypts.is_empty() {
        return Err(SabakanError::EncryptionKeyExists);
    }

    let (mut set, rack_rev) = load_rack_index(store, prefix, machine.rack).await?;
    set.used.remove(&machine.index_in_rack);

    let mut ops = vec![Op::delete(keys::machine(prefix, serial))];
    let mut guards = vec![Guard::at_revision(
        keys::machine(prefix, serial),
        kv.revision,
    )];
    if let Some(rev) = rack_rev {
        guards.push(Guard::at_revision(keys::rack_index(prefix, machine.rack), rev));
        let value = serde_json::to_vec(&set).map_err(|e| SabakanError::Store(e.into()))?;
        ops.push(Op::put(keys::rack_index(prefix, machine.rack), value));
    }

    let applied = store.txn(guards, ops, Vec::new()).await?;
    if !applied {
        return Err(SabakanError::Conflicted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MemStore;

    fn config() -> IpamConfig {
        IpamConfig {
            max_nodes_in_rack: 2,
            node_ipv4_pool: "10.69.0.0/20".into(),
            node_ipv6_pool: None,
            node_range_size: 6,
            node_range_mask: 26,
            node_index_offset: 3,
            node_ip_per_node: 2,
            bmc_ipv4_pool: "10.72.16.0/20".into(),
            bmc_range_size: 5,
            bmc_range_mask: 20,
        }
    }

    fn request(serial: &str, rack: u32) -> RegistrationRequest {
        RegistrationRequest {
            serial: serial.into(),
            product: "R640".into(),
            datacenter: "dc1".into(),
            rack,
            role: "worker".into(),
            bmc_type: crate::types::BMC_IDRAC9.into(),
            labels: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn register_rejects_without_ipam_config() {
        let store = MemStore::new();
        let err = register(&store, "sabakan", vec![request("s1", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, SabakanError::IpamNotConfigured));
    }

    #[tokio::test]
    async fn register_assigns_distinct_indices_in_same_rack() {
        let store = MemStore::new();
        put_ipam_config(&store, "sabakan", &config()).await.unwrap();

        let machines = register(&store, "sabakan", vec![request("s1", 0), request("s2", 0)])
            .await
            .unwrap();
        assert_ne!(machines[0].index_in_rack, machines[1].index_in_rack);
        assert_eq!(machines[0].status.state, MachineState::Uninitialized);
    }

    #[tokio::test]
    async fn register_rejects_duplicate_serial_in_one_batch() {
        let store = MemStore::new();
        put_ipam_config(&store, "sabakan", &config()).await.unwrap();
        let err = register(&store, "sabakan", vec![request("s1", 0), request("s1", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, SabakanError::BadRequest(_)));
    }

    #[tokio::test]
    async fn register_returns_rack_full_once_capacity_exhausted() {
        let store = MemStore::new();
        put_ipam_config(&store, "sabakan", &config()).await.unwrap();
        register(&store, "sabakan", vec![request("s1", 0), request("s2", 0)])
            .await
            .unwrap();
        let err = register(&store, "sabakan", vec![request("s3", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, SabakanError::RackFull));
    }

    fn request_with_role(serial: &str, rack: u32, role: &str) -> RegistrationRequest {
        RegistrationRequest {
            role: role.into(),
            ..request(serial, rack)
        }
    }

    // Seed scenario S1 (spec.md §8): MaxNodesInRack=3, NodeIndexOffset=3.
    #[tokio::test]
    async fn s1_rack_fill_reserves_dedicated_boot_slot() {
        let store = MemStore::new();
        let config = IpamConfig {
            max_nodes_in_rack: 3,
            ..config()
        };
        put_ipam_config(&store, "sabakan", &config).await.unwrap();

        let boot = register(
            &store,
            "sabakan",
            vec![request_with_role("boot-01", 0, ROLE_BOOT)],
        )
        .await
        .unwrap();
        assert_eq!(boot[0].index_in_rack, config.node_index_offset);

        let w1 = register(&store, "sabakan", vec![request_with_role("w-01", 0, "worker")])
            .await
            .unwrap();
        assert_eq!(w1[0].index_in_rack, config.node_index_offset + 1);

        let w2 = register(&store, "sabakan", vec![request_with_role("w-02", 0, "worker")])
            .await
            .unwrap();
        assert_eq!(w2[0].index_in_rack, config.node_index_offset + 2);

        let err = register(&store, "sabakan", vec![request_with_role("w-03", 0, "worker")])
            .await
            .unwrap_err();
        assert!(matches!(err, SabakanError::RackFull));
    }

    #[tokio::test]
    async fn second_boot_server_in_same_rack_conflicts() {
        let store = MemStore::new();
        put_ipam_config(&store, "sabakan", &config()).await.unwrap();
        register(
            &store,
            "sabakan",
            vec![request_with_role("boot-01", 0, ROLE_BOOT)],
        )
        .await
        .unwrap();
        let err = register(
            &store,
            "sabakan",
            vec![request_with_role("boot-02", 0, ROLE_BOOT)],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SabakanError::Conflicted));
    }

    #[tokio::test]
    async fn register_rejects_invalid_role() {
        let store = MemStore::new();
        put_ipam_config(&store, "sabakan", &config()).await.unwrap();
        let err = register(
            &store,
            "sabakan",
            vec![request_with_role("s1", 0, "bad role")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SabakanError::BadRequest(_)));
    }

    #[tokio::test]
    async fn put_ipam_config_rejected_once_machines_exist() {
        let store = MemStore::new();
        put_ipam_config(&store, "sabakan", &config()).await.unwrap();
        register(&store, "sabakan", vec![request("s1", 0)])
            .await
            .unwrap();
        let err = put_ipam_config(&store, "sabakan", &config()).await.unwrap_err();
        assert!(matches!(err, SabakanError::MachinesExist));
    }

    #[tokio::test]
    async fn delete_requires_retired_state() {
        let store = MemStore::new();
        put_ipam_config(&store, "sabakan", &config()).await.unwrap();
        register(&store, "sabakan", vec![request("s1", 0)])
            .await
            .unwrap();
        let err = delete_machine(&store, "sabakan", "s1").await.unwrap_err();
        assert!(matches!(err, SabakanError::MachineIsNotRetired));
    }

    #[tokio::test]
    async fn delete_rejects_retired_machine_with_remaining_crypt_keys() {
        use crate::lifecycle::{set_state, MachineState};

        let store = MemStore::new();
        put_ipam_config(&store, "sabakan", &config()).await.unwrap();
        register(&store, "sabakan", vec![request("s1", 0)])
            .await
            .unwrap();
        set_state(&store, "sabakan", "s1", MachineState::Healthy)
            .await
            .unwrap();
        crate::crypt::put(&store, "sabakan", "s1", "sda", b"secret".to_vec())
            .await
            .unwrap();
        set_state(&store, "sabakan", "s1", MachineState::Retiring)
            .await
            .unwrap();

        // crypt key still present: the final hop into `retired` is the
        // one gated on key absence, so force the state directly here to
        // exercise `delete_machine`'s own guard (spec.md §4.4 Delete).
        let kv = store.get(&keys::machine("sabakan", "s1")).await.unwrap().unwrap();
        let mut machine: Machine = serde_json::from_slice(&kv.value).unwrap();
        machine.status = crate::lifecycle::Status::new(MachineState::Retired, Utc::now());
        store
            .put(&keys::machine("sabakan", "s1"), serde_json::to_vec(&machine).unwrap())
            .await
            .unwrap();

        let err = delete_machine(&store, "sabakan", "s1").await.unwrap_err();
        assert!(matches!(err, SabakanError::EncryptionKeyExists));
    }
}
