//! Shared axum state: the store handle and the caches the watcher keeps
//! current. Cheap to clone — everything inside is already `Arc`-wrapped.

use std::sync::Arc;

use sabakan_core::cache::Caches;
use sabakan_core::Store;

use crate::asset_body::AssetBodyStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub caches: Arc<Caches>,
    pub prefix: String,
    pub asset_bodies: Arc<dyn AssetBodyStore>,
}
