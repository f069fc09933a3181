//! Messages pushed down the live-update channel.

use serde::Serialize;

/// One message on the live-update channel, serialized as
/// `{"action": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum UpdateEvent {
    /// The output directory is being rewritten.
    Building,
    /// A rebuild finished.
    Built { hash: String, time_ms: u64 },
    /// Current state, sent on connect and after a lagging client catches up.
    Sync { hash: String },
    /// Keeps the client's disconnect timer from firing.
    Heartbeat,
}

impl UpdateEvent {
    pub fn hash(&self) -> Option<&str> {
        match self {
            UpdateEvent::Built { hash, .. } | UpdateEvent::Sync { hash } => Some(hash),
            UpdateEvent::Building | UpdateEvent::Heartbeat => None,
        }
    }
}
