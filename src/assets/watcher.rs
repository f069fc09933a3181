//! Output directory watcher that drives rebuild notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::assets::store::ArtifactStore;
use crate::live_update::{LiveUpdateHub, UpdateEvent};
use crate::observability::metrics;

/// Watches the bundler's output directory and turns each burst of writes
/// into one `building` / `built` pair on the live-update hub.
pub struct AssetWatcher {
    root: PathBuf,
    debounce: Duration,
    store: Arc<ArtifactStore>,
    hub: LiveUpdateHub,
}

impl AssetWatcher {
    pub fn new(store: Arc<ArtifactStore>, hub: LiveUpdateHub, debounce: Duration) -> Self {
        Self {
            root: store.root().to_path_buf(),
            debounce,
            store,
            hub,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start watching. The returned watcher must be kept alive.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        std::fs::create_dir_all(&self.root).map_err(notify::Error::io)?;

        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove() {
                        let _ = change_tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        tracing::info!(path = ?self.root, "Output directory watcher started");

        tokio::spawn(rebuild_loop(change_rx, self.store, self.hub, self.debounce));
        Ok(watcher)
    }
}

async fn rebuild_loop(
    mut changes: mpsc::UnboundedReceiver<()>,
    store: Arc<ArtifactStore>,
    hub: LiveUpdateHub,
    debounce: Duration,
) {
    while changes.recv().await.is_some() {
        let started = Instant::now();
        hub.publish(UpdateEvent::Building);

        // wait for the burst to go quiet
        loop {
            match tokio::time::timeout(debounce, changes.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        rebuild(&store, &hub, started).await;
    }
}

/// Refresh the store and announce the new build.
pub async fn rebuild(store: &Arc<ArtifactStore>, hub: &LiveUpdateHub, started: Instant) {
    let refresh_store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || refresh_store.refresh()).await {
        Ok(Ok(hash)) => {
            let time_ms = started.elapsed().as_millis() as u64;
            let clients = hub.publish(UpdateEvent::Built {
                hash: hash.clone(),
                time_ms,
            });
            metrics::record_build();
            tracing::info!(hash = %hash, time_ms, clients, "Build output updated");
        }
        Ok(Err(e)) => {
            tracing::warn!(root = %store.root().display(), error = %e, "Failed to read build output");
        }
        Err(e) => tracing::error!(error = %e, "Rebuild task failed"),
    }
}

/// Load the initial build hash into the hub without notifying anyone.
///
/// A memory store already holds the snapshot scanned at construction.
pub async fn prime(store: &Arc<ArtifactStore>, hub: &LiveUpdateHub) -> std::io::Result<()> {
    if let Some(snapshot) = store.snapshot() {
        hub.set_hash(snapshot.hash().to_string());
        return Ok(());
    }

    let refresh_store = Arc::clone(store);
    let hash = tokio::task::spawn_blocking(move || refresh_store.refresh())
        .await
        .map_err(std::io::Error::other)??;
    hub.set_hash(hash);
    Ok(())
}
