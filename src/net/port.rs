//! Port allocation with conflict retry.
//!
//! # Responsibilities
//! - Probe whether a candidate port can be bound
//! - Step upward past ports that are already in use
//! - Bind the real listener on the first free port
//! - Surface anything other than a port conflict as fatal
//!
//! # Design Decisions
//! - Sequential: one probe socket open at a time, closed before the real bind
//! - The candidate port lives in the loop, not in shared state
//! - A lost race between probe and bind counts as another conflict

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

/// Error type for port allocation.
#[derive(Debug, Error)]
pub enum PortError {
    /// Binding failed for a reason other than the port being taken.
    #[error("failed to bind port {port}: {source}")]
    Fatal {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The configured attempt limit ran out.
    #[error("no free port found after {attempts} attempts starting at {start}")]
    Exhausted { start: u16, attempts: u32 },

    /// The candidate walked off the end of the port range (or started at 0).
    #[error("no free port in range {start}..=65535")]
    OutOfRange { start: u16 },
}

/// Finds a free TCP port at or above a starting port and binds to it.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    host: IpAddr,
    start: u16,
    max_attempts: Option<u32>,
}

impl PortAllocator {
    /// Create an allocator that starts probing at `start`.
    pub fn new(host: IpAddr, start: u16) -> Self {
        Self {
            host,
            start,
            max_attempts: None,
        }
    }

    /// Bound the number of candidates tried. `None` means unbounded.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Open a listening socket on `addr` and close it again.
    pub async fn probe(addr: SocketAddr) -> std::io::Result<()> {
        let probe = TcpListener::bind(addr).await?;
        drop(probe);
        Ok(())
    }

    /// Find the first free port and return the listener bound to it.
    pub async fn allocate(&self) -> Result<TcpListener, PortError> {
        if self.start == 0 {
            return Err(PortError::OutOfRange { start: self.start });
        }

        let mut port = self.start;
        let mut attempts: u32 = 0;

        loop {
            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    return Err(PortError::Exhausted {
                        start: self.start,
                        attempts,
                    });
                }
            }
            attempts += 1;

            let addr = SocketAddr::new(self.host, port);
            let bound = match Self::probe(addr).await {
                Ok(()) => TcpListener::bind(addr).await,
                Err(e) => Err(e),
            };

            match bound {
                Ok(listener) => {
                    tracing::debug!(port, attempts, "Port allocated");
                    return Ok(listener);
                }
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    tracing::debug!(port, "Port in use, trying next");
                    port = port
                        .checked_add(1)
                        .ok_or(PortError::OutOfRange { start: self.start })?;
                }
                Err(source) => return Err(PortError::Fatal { port, source }),
            }
        }
    }
}
