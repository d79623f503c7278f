//! [`EtcdStore`]: the only piece of this stack that talks etcd wire
//! protocol. Every [`sabakan_core::Store`] method maps onto exactly one
//! etcd RPC.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, GetOptions, TxnOp, WatchOptions};
use futures::StreamExt;

use sabakan_core::error::{Result, SabakanError};
use sabakan_core::store::{Guard, KeyValue, LeaseId, Op, Store, WatchEvent, WatchEventKind, WatchStream};

/// A connected etcd client. Has no notion of sabakan's own `P/...` key
/// prefix convention — that lives entirely in `sabakan_core::store::keys`.
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    pub async fn connect<E: AsRef<str>>(endpoints: &[E]) -> anyhow::Result<Self> {
        let client = Client::connect(endpoints, None)
            .await
            .context("connecting to etcd")?;
        Ok(Self { client })
    }
}

fn to_store_err(e: etcd_client::Error) -> SabakanError {
    SabakanError::Store(anyhow!(e))
}

#[async_trait]
impl Store for EtcdStore {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        let mut kv_client = self.client.kv_client();
        let resp = kv_client.get(key, None).await.map_err(to_store_err)?;
        Ok(resp.kvs().first().map(|kv| KeyValue {
            key: key.to_string(),
            value: kv.value().to_vec(),
            revision: kv.mod_revision(),
        }))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<i64> {
        let mut kv_client = self.client.kv_client();
        let resp = kv_client
            .put(key, value, None)
            .await
            .map_err(to_store_err)?;
        resp.header()
            .map(|h| h.revision())
            .ok_or_else(|| SabakanError::Store(anyhow!("etcd response missing header")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut kv_client = self.client.kv_client();
        kv_client.delete(key, None).await.map_err(to_store_err)?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        let mut kv_client = self.client.kv_client();
        let resp = kv_client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(to_store_err)?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| KeyValue {
                key: String::from_utf8_lossy(kv.key()).into_owned(),
                value: kv.value().to_vec(),
                revision: kv.mod_revision(),
            })
            .collect())
    }

    async fn txn(&self, guards: Vec<Guard>, then: Vec<Op>, or_else: Vec<Op>) -> Result<bool> {
        let compares: Vec<Compare> = guards
            .into_iter()
            .map(|g| match g.expected_revision {
                Some(rev) => Compare::mod_revision(g.key, CompareOp::Equal, rev),
                None => Compare::mod_revision(g.key, CompareOp::Equal, 0),
            })
            .collect();

        let to_txn_op = |op: Op| match op {
            Op::Put { key, value } => TxnOp::put(key, value, None),
            Op::Delete { key } => TxnOp::delete(key, None),
        };

        let txn = etcd_client::Txn::new()
            .when(compares)
            .and_then(then.into_iter().map(to_txn_op).collect::<Vec<_>>())
            .or_else(or_else.into_iter().map(to_txn_op).collect::<Vec<_>>());

        let mut kv_client = self.client.kv_client();
        let resp = kv_client.txn(txn).await.map_err(to_store_err)?;
        Ok(resp.succeeded())
    }

    async fn current_revision(&self) -> Result<i64> {
        let mut kv_client = self.client.kv_client();
        // A range get on a key that cannot exist still returns a header
        // carrying the current cluster revision, with no data transfer.
        let resp = kv_client.get("\0", None).await.map_err(to_store_err)?;
        resp.header()
            .map(|h| h.revision())
            .ok_or_else(|| SabakanError::Store(anyhow!("etcd response missing header")))
    }

    async fn watch_from(&self, prefix: &str, from_revision: i64) -> Result<WatchStream> {
        let mut watch_client = self.client.watch_client();
        let (_watcher, stream) = watch_client
            .watch(
                prefix,
                Some(
                    WatchOptions::new()
                        .with_prefix()
                        .with_start_revision(from_revision),
                ),
            )
            .await
            .map_err(to_store_err)?;

        // etcd replays history from `from_revision` through its own
        // watch RPC before switching to live events — no separate
        // replay step is needed here, unlike the in-memory mock.
        let mapped = stream.flat_map(|resp| {
            let events: Vec<Result<WatchEvent>> = match resp {
                Ok(resp) => resp
                    .events()
                    .iter()
                    .filter_map(|ev| {
                        let kv = ev.kv()?;
                        let kind = match ev.event_type() {
                            etcd_client::EventType::Put => WatchEventKind::Put,
                            etcd_client::EventType::Delete => WatchEventKind::Delete,
                        };
                        let value = matches!(kind, WatchEventKind::Put).then(|| kv.value().to_vec());
                        Some(Ok(WatchEvent {
                            kind,
                            key: String::from_utf8_lossy(kv.key()).into_owned(),
                            value,
                            revision: kv.mod_revision(),
                        }))
                    })
                    .collect(),
                Err(e) => vec![Err(to_store_err(e))],
            };
            futures::stream::iter(events)
        });

        Ok(Box::pin(mapped))
    }

    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId> {
        let mut lease_client = self.client.lease_client();
        let resp = lease_client
            .grant(ttl_secs, None)
            .await
            .map_err(to_store_err)?;
        Ok(LeaseId(resp.id()))
    }
}
