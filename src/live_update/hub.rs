//! Fan-out of update events to connected clients.
//!
//! # Responsibilities
//! - Broadcast update events to every subscribed client
//! - Remember the latest build hash for late joiners
//! - Count connected clients for logs and metrics
//! - Tell open streams to end on shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, watch};

use crate::live_update::events::UpdateEvent;
use crate::observability::metrics;

/// Global atomic counter for client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a live-update client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        Self(CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Counts connected clients.
#[derive(Debug, Clone, Default)]
pub struct ClientTracker {
    active_count: Arc<AtomicU64>,
}

impl ClientTracker {
    /// Record a new client. Returns a guard that decrements on drop.
    pub fn track(&self) -> ClientGuard {
        let count = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_live_clients(count);
        let id = ClientId::next();
        tracing::debug!(client = %id, connected = count, "Live-update client connected");
        ClientGuard {
            active_count: Arc::clone(&self.active_count),
            id,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a client's lifetime.
#[derive(Debug)]
pub struct ClientGuard {
    active_count: Arc<AtomicU64>,
    id: ClientId,
}

impl ClientGuard {
    pub fn id(&self) -> ClientId {
        self.id
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let remaining = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_live_clients(remaining);
        tracing::debug!(client = %self.id, connected = remaining, "Live-update client disconnected");
    }
}

/// Shared broadcast point between the rebuild task and client streams.
#[derive(Clone)]
pub struct LiveUpdateHub {
    tx: broadcast::Sender<UpdateEvent>,
    hash: Arc<ArcSwap<String>>,
    clients: ClientTracker,
    closed: Arc<watch::Sender<bool>>,
}

impl LiveUpdateHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            tx,
            hash: Arc::new(ArcSwap::from_pointee(String::new())),
            clients: ClientTracker::default(),
            closed: Arc::new(closed),
        }
    }

    /// Subscribe a new client.
    pub fn subscribe(&self) -> (broadcast::Receiver<UpdateEvent>, ClientGuard) {
        (self.tx.subscribe(), self.clients.track())
    }

    /// Send an event to every connected client. Returns how many received it.
    pub fn publish(&self, event: UpdateEvent) -> usize {
        if let UpdateEvent::Built { hash, .. } = &event {
            self.hash.store(Arc::new(hash.clone()));
        }
        self.tx.send(event).unwrap_or(0)
    }

    /// Set the hash without notifying anyone (initial scan).
    pub fn set_hash(&self, hash: String) {
        self.hash.store(Arc::new(hash));
    }

    pub fn current_hash(&self) -> String {
        self.hash.load().as_ref().clone()
    }

    pub fn sync_event(&self) -> UpdateEvent {
        UpdateEvent::Sync {
            hash: self.current_hash(),
        }
    }

    pub fn client_count(&self) -> u64 {
        self.clients.active_count()
    }

    /// End every open stream.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Resolves once `close` has been called.
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

impl Default for LiveUpdateHub {
    fn default() -> Self {
        Self::new(64)
    }
}
