//! sabakan — rack-aware bare-metal provisioning service.
//!
//! Connects to etcd, spawns the watcher, waits for it to signal
//! readiness, then serves the REST API.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use sabakan_core::cache::Caches;
use sabakan_core::watcher::{readiness_channel, Watcher};
use sabakan_core::Store;
use sabakan_server::asset_body::InMemoryAssetBodyStore;
use sabakan_server::config::Config;
use sabakan_server::router::build_router;
use sabakan_server::state::AppState;
use sabakan_store_etcd::EtcdStore;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sabakan_server=debug".into()),
        )
        .init();

    let config = Config::parse();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "sabakan exited with a fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(EtcdStore::connect(&config.etcd_servers).await?);
    let caches = Arc::new(Caches::default());
    let (ready_tx, mut ready_rx) = readiness_channel();

    let watcher = Watcher::new(
        Arc::clone(&store),
        config.etcd_prefix.clone(),
        Arc::clone(&caches),
        ready_tx,
    );
    tokio::spawn(async move {
        if let Err(err) = watcher.run().await {
            // A watch failure is fatal to the process (spec.md §4.3) — the
            // caches may no longer reflect the store, so serving on would
            // mean silently serving stale data.
            tracing::error!(error = %err, "watcher terminated; exiting");
            std::process::exit(1);
        }
    });

    tracing::info!("waiting for watcher to seed caches");
    ready_rx.changed().await?;
    tracing::info!("caches seeded, ready to serve");

    let state = AppState {
        store,
        caches,
        prefix: config.etcd_prefix,
        asset_bodies: Arc::new(InMemoryAssetBodyStore::default()),
    };
    let app = build_router(state);

    let listener = TcpListener::bind(&config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "sabakan listening");
    axum::serve(listener, app).await?;

    Ok(())
}
