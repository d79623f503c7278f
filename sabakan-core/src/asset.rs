//! Asset metadata store (spec.md §3/§6).
//!
//! The asset *body* — the actual binary payload, e.g. an OS image or a
//! container-linux-config bundle — is out of scope here (spec.md §1
//! "the asset byte store"): this module owns only the typed metadata
//! record keyed by `name`. A caller that already has the body bytes
//! computes their sha256 and passes it in; nothing in this crate reads
//! or writes a byte store.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{Result, SabakanError};
use crate::store::{keys, Guard, Op, Store};
use crate::types::AssetMeta;

/// Hex-encodes the sha256 digest of `body`, for a caller that has the
/// bytes in hand and needs the value to pass to [`put`].
pub fn sha256_hex(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Fetches the metadata record for `name`.
pub async fn get(store: &dyn Store, prefix: &str, name: &str) -> Result<AssetMeta> {
    let kv = store
        .get(&keys::asset(prefix, name))
        .await?
        .ok_or(SabakanError::NotFound)?;
    serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into()))
}

/// Lists every known asset's metadata, ordered by name.
pub async fn list(store: &dyn Store, prefix: &str) -> Result<Vec<AssetMeta>> {
    let entries = store.scan_prefix(&keys::assets_prefix(prefix)).await?;
    entries
        .into_iter()
        .map(|kv| serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into())))
        .collect()
}

/// Writes a new revision of `name`'s metadata: `id` is fresh on every
/// write (the store revision at commit time), and replacing an
/// existing asset bumps `version`; creating a brand new one starts at
/// version 1 (spec.md §3).
pub async fn put(
    store: &dyn Store,
    prefix: &str,
    name: &str,
    content_type: String,
    sha256: String,
    size: u64,
) -> Result<AssetMeta> {
    const MAX_ATTEMPTS: usize = 5;
    let key = keys::asset(prefix, name);

    for _ in 0..MAX_ATTEMPTS {
        let existing = store.get(&key).await?;
        let (version, guard) = match &existing {
            Some(kv) => {
                let prev: AssetMeta =
                    serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into()))?;
                (prev.version + 1, Guard::at_revision(&key, kv.revision))
            }
            None => (1, Guard::absent(&key)),
        };

        let id = store.current_revision().await? as u64 + 1;
        let meta = AssetMeta {
            id,
            name: name.to_string(),
            content_type: content_type.clone(),
            sha256: sha256.clone(),
            version,
            date: Utc::now(),
            size,
        };
        let value = serde_json::to_vec(&meta).map_err(|e| SabakanError::Store(e.into()))?;

        if store
            .txn(vec![guard], vec![Op::put(&key, value)], Vec::new())
            .await?
        {
            return Ok(meta);
        }
    }

    Err(SabakanError::Conflicted)
}

/// Deletes `name`'s metadata record. The caller is responsible for also
/// reclaiming the body bytes from whatever store holds them.
pub async fn delete(store: &dyn Store, prefix: &str, name: &str) -> Result<()> {
    let key = keys::asset(prefix, name);
    let kv = store.get(&key).await?.ok_or(SabakanError::NotFound)?;
    let applied = store
        .txn(
            vec![Guard::at_revision(&key, kv.revision)],
            vec![Op::delete(&key)],
            Vec::new(),
        )
        .await?;
    if !applied {
        return Err(SabakanError::Conflicted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MemStore;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemStore::new();
        let meta = put(
            &store,
            "sabakan",
            "ubuntu.img",
            "application/octet-stream".into(),
            sha256_hex(b"body"),
            4,
        )
        .await
        .unwrap();
        assert_eq!(meta.version, 1);
        let got = get(&store, "sabakan", "ubuntu.img").await.unwrap();
        assert_eq!(got, meta);
    }

    #[tokio::test]
    async fn replacing_name_bumps_version_with_fresh_id() {
        let store = MemStore::new();
        let first = put(
            &store,
            "sabakan",
            "ubuntu.img",
            "application/octet-stream".into(),
            sha256_hex(b"v1"),
            2,
        )
        .await
        .unwrap();
        let second = put(
            &store,
            "sabakan",
            "ubuntu.img",
            "application/octet-stream".into(),
            sha256_hex(b"v2"),
            2,
        )
        .await
        .unwrap();
        assert_eq!(second.version, first.version + 1);
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn delete_removes_metadata() {
        let store = MemStore::new();
        put(&store, "sabakan", "a", "text/plain".into(), sha256_hex(b"x"), 1)
            .await
            .unwrap();
        delete(&store, "sabakan", "a").await.unwrap();
        let err = get(&store, "sabakan", "a").await.unwrap_err();
        assert!(matches!(err, SabakanError::NotFound));
    }
}
