//! The asset byte store (spec.md §1 Non-goals: "the asset byte store" is
//! an external collaborator, specified only at its interface boundary).
//! `AssetBodyStore` is that boundary — pluggable so a real deployment can
//! back it with object storage; [`InMemoryAssetBodyStore`] exists only so
//! this server is runnable without one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use sabakan_core::error::{Result, SabakanError};

#[async_trait]
pub trait AssetBodyStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Vec<u8>>;
    async fn put(&self, name: &str, body: Vec<u8>) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryAssetBodyStore {
    bodies: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

#[async_trait]
impl AssetBodyStore for InMemoryAssetBodyStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.bodies
            .read()
            .await
            .get(name)
            .map(|b| b.as_ref().clone())
            .ok_or(SabakanError::NotFound)
    }

    async fn put(&self, name: &str, body: Vec<u8>) -> Result<()> {
        self.bodies
            .write()
            .await
            .insert(name.to_string(), Arc::new(body));
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.bodies.write().await.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = InMemoryAssetBodyStore::default();
        store.put("a", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = InMemoryAssetBodyStore::default();
        store.put("a", b"hello".to_vec()).await.unwrap();
        store.delete("a").await.unwrap();
        assert!(matches!(store.get("a").await.unwrap_err(), SabakanError::NotFound));
    }
}
