//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → port.rs (probe candidate, step past conflicts, bind)
//!     → TcpListener handed to the HTTP server for the process lifetime
//! ```
//!
//! # Design Decisions
//! - Probing is sequential; only one socket is ever open during the search
//! - Only "address in use" is retried; every other bind error is fatal

pub mod port;

pub use port::{PortAllocator, PortError};
