//! Live-update (hot reload) subsystem.
//!
//! # Data Flow
//! ```text
//! assets::watcher (output directory rewritten)
//!     → hub.rs (broadcast building / built, remember hash)
//!     → middleware.rs (one SSE stream per browser client)
//!     → client.js (reloads the page when the hash changes)
//! ```
//!
//! # Design Decisions
//! - Server-Sent Events: one-way, plain HTTP, reconnects built into browsers
//! - Heartbeats are real messages so the client's timeout timer resets
//! - The heartbeat must stay below the client timeout; this is left to the
//!   operator and only reported as a config warning

pub mod events;
pub mod hub;
pub mod middleware;

pub use events::UpdateEvent;
pub use hub::{ClientGuard, ClientTracker, LiveUpdateHub};
pub use middleware::LiveUpdateMiddleware;
