//! sabakan-server — axum REST frontend and CLI binary over `sabakan-core`.
//!
//! Holds no domain logic of its own: every handler is a thin extractor
//! + call-into-`sabakan-core` + response-mapping shim. The long-lived
//! watcher task and the etcd connection are wired up in `main`.

pub mod asset_body;
pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
