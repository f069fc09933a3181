//! Build-output subsystem.
//!
//! # Data Flow
//! ```text
//! bundler writes dist/
//!     → watcher.rs (notify events, debounced)
//!     → store.rs (rescan, atomic snapshot swap, new build hash)
//!     → live_update hub (building / built)
//!
//! GET /<public_path>/...
//!     → middleware.rs (resolve key, serve artifact or pass)
//! ```
//!
//! # Design Decisions
//! - The bundler stays external; only its output directory is consumed
//! - Unknown paths are passed on, never answered with 404 here

pub mod middleware;
pub mod store;
pub mod watcher;

pub use middleware::AssetMiddleware;
pub use store::{Artifact, ArtifactStore, Snapshot};
pub use watcher::AssetWatcher;
