//! Ignition template store (spec.md §4.7, component G).
//!
//! Templates are kept per role, newest-last, capped at [`MAX_IGNITIONS`]
//! (oldest dropped on overflow). IDs are zero-padded store revisions —
//! they sort lexicographically in the same order they were created,
//! which is what the key-prefix scan in [`list`] relies on.

use crate::error::{Result, SabakanError};
use crate::store::{keys, Guard, Op, Store};
use crate::types::{IgnitionTemplate, MAX_IGNITIONS};

const ID_WIDTH: usize = 20;

fn format_id(revision: i64) -> String {
    format!("{revision:0width$}", width = ID_WIDTH)
}

/// Lists all templates for `role`, oldest first. A role with no
/// templates is indistinguishable from one that never existed, so this
/// returns `ErrNotFound` rather than an empty list (spec.md §4.7).
pub async fn list(store: &dyn Store, prefix: &str, role: &str) -> Result<Vec<IgnitionTemplate>> {
    let entries = store.scan_prefix(&keys::ignitions_prefix(prefix, role)).await?;
    if entries.is_empty() {
        return Err(SabakanError::NotFound);
    }
    entries
        .into_iter()
        .map(|kv| serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into())))
        .collect()
}

/// Fetches one template by id, or the newest if `id` is `None`.
pub async fn get(
    store: &dyn Store,
    prefix: &str,
    role: &str,
    id: Option<&str>,
) -> Result<IgnitionTemplate> {
    match id {
        Some(id) => {
            let kv = store
                .get(&keys::ignition(prefix, role, id))
                .await?
                .ok_or(SabakanError::NotFound)?;
            serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into()))
        }
        None => list(store, prefix, role)
            .await?
            .pop()
            .ok_or(SabakanError::NotFound),
    }
}

/// Adds a new template revision for `role`. If the role already holds
/// [`MAX_IGNITIONS`] templates, the oldest is dropped in the same
/// transaction so the cap is never exceeded even under a race.
pub async fn put(
    store: &dyn Store,
    prefix: &str,
    role: &str,
    content: String,
    metadata: std::collections::BTreeMap<String, String>,
) -> Result<IgnitionTemplate> {
    const MAX_ATTEMPTS: usize = 5;

    for _ in 0..MAX_ATTEMPTS {
        let existing = store.scan_prefix(&keys::ignitions_prefix(prefix, role)).await?;
        let revision = store.current_revision().await? + 1;
        let id = format_id(revision);
        let key = keys::ignition(prefix, role, &id);

        let template = IgnitionTemplate {
            id: id.clone(),
            content: content.clone(),
            metadata: metadata.clone(),
        };
        let value = serde_json::to_vec(&template).map_err(|e| SabakanError::Store(e.into()))?;

        let mut guards = vec![Guard::absent(&key)];
        let mut ops = vec![Op::put(&key, value)];

        if existing.len() >= MAX_IGNITIONS {
            if let Some(oldest) = existing.first() {
                guards.push(Guard::at_revision(&oldest.key, oldest.revision));
                ops.push(Op::delete(&oldest.key));
            }
        }

        if store.txn(guards, ops, Vec::new()).await? {
            return Ok(template);
        }
    }

    Err(SabakanError::Conflicted)
}

/// Removes a single template revision.
pub async fn delete(store: &dyn Store, prefix: &str, role: &str, id: &str) -> Result<()> {
    let key = keys::ignition(prefix, role, id);
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
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn put_then_get_latest_roundtrips() {
        let store = MemStore::new();
        put(&store, "sabakan", "worker", "a".into(), BTreeMap::new())
            .await
            .unwrap();
        let t2 = put(&store, "sabakan", "worker", "b".into(), BTreeMap::new())
            .await
            .unwrap();
        let latest = get(&store, "sabakan", "worker", None).await.unwrap();
        assert_eq!(latest.id, t2.id);
        assert_eq!(latest.content, "b");
    }

    #[tokio::test]
    async fn list_is_ordered_oldest_first() {
        let store = MemStore::new();
        for c in ["a", "b", "c"] {
            put(&store, "sabakan", "worker", c.into(), BTreeMap::new())
                .await
                .unwrap();
        }
        let all = list(&store, "sabakan", "worker").await.unwrap();
        assert_eq!(
            all.iter().map(|t| t.content.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn cap_drops_oldest_once_exceeded() {
        let store = MemStore::new();
        for i in 0..MAX_IGNITIONS + 2 {
            put(&store, "sabakan", "worker", i.to_string(), BTreeMap::new())
                .await
                .unwrap();
        }
        let all = list(&store, "sabakan", "worker").await.unwrap();
        assert_eq!(all.len(), MAX_IGNITIONS);
        assert_eq!(all[0].content, "2");
    }

    #[tokio::test]
    async fn delete_removes_one_revision() {
        let store = MemStore::new();
        let t = put(&store, "sabakan", "worker", "a".into(), BTreeMap::new())
            .await
            .unwrap();
        delete(&store, "sabakan", "worker", &t.id).await.unwrap();
        let err = list(&store, "sabakan", "worker").await.unwrap_err();
        assert!(matches!(err, SabakanError::NotFound));
    }

    #[tokio::test]
    async fn list_of_unknown_role_is_not_found() {
        let store = MemStore::new();
        let err = list(&store, "sabakan", "nonexistent").await.unwrap_err();
        assert!(matches!(err, SabakanError::NotFound));
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_not_found() {
        let store = MemStore::new();
        let err = delete(&store, "sabakan", "worker", "no-such-id")
            .await
            .unwrap_err();
        assert!(matches!(err, SabakanError::NotFound));
    }
}
