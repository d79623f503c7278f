//! Disk-encryption key brokerage (spec.md §4.6, component F).
//!
//! Keys are opaque bytes to this crate — only the management plane for
//! "one key per (serial, disk), insert-once, deletable only alongside
//! machine retirement" lives here.

use crate::error::{Result, SabakanError};
use crate::lifecycle::MachineState;
use crate::store::{keys, Guard, Op, Store};
use crate::types::Machine;

/// Stores a new encryption key for `(serial, disk)`. Fails if the
/// machine is retired, unknown, or a key already exists for that disk —
/// keys are insert-once, never overwritten in place. The commit is
/// guarded both on the crypt key's absence and on the machine's
/// observed revision, so a concurrent retirement loses the race rather
/// than silently letting a key land after the machine left escrow.
pub async fn put(store: &dyn Store, prefix: &str, serial: &str, disk: &str, data: Vec<u8>) -> Result<()> {
    let machine_key = keys::machine(prefix, serial);
    let kv = store.get(&machine_key).await?.ok_or(SabakanError::NotFound)?;
    let machine: Machine =
        serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into()))?;
    if machine.status.state == MachineState::Retired {
        return Err(SabakanError::EncryptionKeyExists);
    }

    let key = keys::crypt(prefix, serial, disk);
    let applied = store
        .txn(
            vec![
                Guard::absent(&key),
                Guard::at_revision(&machine_key, kv.revision),
            ],
            vec![Op::put(key, data)],
            Vec::new(),
        )
        .await?;
    if !applied {
        return Err(SabakanError::EncryptionKeyExists);
    }
    Ok(())
}

/// Fetches the encryption key for `(serial, disk)`.
pub async fn get(store: &dyn Store, prefix: &str, serial: &str, disk: &str) -> Result<Vec<u8>> {
    store
        .get(&keys::crypt(prefix, serial, disk))
        .await?
        .map(|kv| kv.value)
        .ok_or(SabakanError::NotFound)
}

/// Deletes every encryption key for `serial` in one pass, regardless of
/// the machine's current lifecycle state (spec.md §4.6: "no-op if none
/// exist", no retirement gate). This is what the lifecycle transition to
/// `retiring` leans on: keys are cleared here *before* the machine
/// reaches `retired`, so that the final `retiring -> retired` transition
/// finds the crypt prefix already empty (seed scenario S4).
pub async fn delete_all(store: &dyn Store, prefix: &str, serial: &str) -> Result<()> {
    let entries = store.scan_prefix(&keys::crypts_prefix(prefix, serial)).await?;
    for entry in entries {
        store.delete(&entry.key).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipam::{put_ipam_config, register, RegistrationRequest};
    use crate::store::mock::MemStore;
    use crate::types::IpamConfig;
    use std::collections::BTreeMap;

    async fn seeded_machine(store: &MemStore, serial: &str) {
        let config = IpamConfig {
            max_nodes_in_rack: 4,
            node_ipv4_pool: "10.69.0.0/20".into(),
            node_ipv6_pool: None,
            node_range_size: 6,
            node_range_mask: 26,
            node_index_offset: 3,
            node_ip_per_node: 1,
            bmc_ipv4_pool: "10.72.16.0/20".into(),
            bmc_range_size: 5,
            bmc_range_mask: 20,
        };
        put_ipam_config(store, "sabakan", &config).await.unwrap();
        register(
            store,
            "sabakan",
            vec![RegistrationRequest {
                serial: serial.into(),
                product: "R640".into(),
                datacenter: "dc1".into(),
                rack: 0,
                role: "worker".into(),
                bmc_type: crate::types::BMC_IDRAC9.into(),
                labels: BTreeMap::new(),
            }],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemStore::new();
        seeded_machine(&store, "s1").await;
        put(&store, "sabakan", "s1", "sda", b"secret".to_vec())
            .await
            .unwrap();
        assert_eq!(get(&store, "sabakan", "s1", "sda").await.unwrap(), b"secret");
    }

    #[tokio::test]
    async fn put_is_insert_once() {
        let store = MemStore::new();
        seeded_machine(&store, "s1").await;
        put(&store, "sabakan", "s1", "sda", b"first".to_vec())
            .await
            .unwrap();
        let err = put(&store, "sabakan", "s1", "sda", b"second".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, SabakanError::EncryptionKeyExists));
    }

    #[tokio::test]
    async fn delete_all_works_regardless_of_machine_state() {
        let store = MemStore::new();
        seeded_machine(&store, "s1").await;
        put(&store, "sabakan", "s1", "sda", b"secret".to_vec())
            .await
            .unwrap();

        // Spec.md §4.6 gates nothing on machine state here — clearing
        // keys ahead of a `retiring -> retired` transition is exactly
        // how a machine is allowed to reach `retired` at all (S4).
        delete_all(&store, "sabakan", "s1").await.unwrap();
        let err = get(&store, "sabakan", "s1", "sda").await.unwrap_err();
        assert!(matches!(err, SabakanError::NotFound));
    }

    #[tokio::test]
    async fn delete_all_is_a_noop_when_no_keys_exist() {
        let store = MemStore::new();
        seeded_machine(&store, "s1").await;
        delete_all(&store, "sabakan", "s1").await.unwrap();
    }
}
