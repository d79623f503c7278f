//! sabakan-store-etcd — the etcd implementation of [`sabakan_core::Store`].
//!
//! A thin newtype over `etcd_client::Client`: every method maps directly
//! onto one etcd RPC, with `txn` built from `Compare`/`TxnOp` and
//! `watch_from` built directly on etcd's own watch RPC, which replays
//! history from `from_revision` before switching to live events itself —
//! no separate replay step is needed on our side, unlike the in-memory
//! mock used in tests.

pub mod store;

pub use store::EtcdStore;
