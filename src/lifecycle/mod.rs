//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Allocate port → Build server → Ready to serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Close live-update streams → Drain requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then port, then the server
//! - Fail fast: any startup error is fatal and the process exits non-zero

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{start, Started, StartupError};
