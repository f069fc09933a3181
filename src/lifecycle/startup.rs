//! Startup orchestration.
//!
//! # Responsibilities
//! - Report config warnings
//! - Allocate the listening port
//! - Build the server on top of the bound listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The port is bound before anything is announced, so the logged port is
//!   the one actually in use

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::validation::warnings;
use crate::config::DevServerConfig;
use crate::http::{DevServer, ServerError};
use crate::live_update::LiveUpdateHub;
use crate::net::{PortAllocator, PortError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid listener host {host:?}")]
    Host { host: String },

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("failed to read bound address: {0}")]
    Address(#[source] std::io::Error),
}

/// A server that is bound and ready to run.
pub struct Started {
    pub server: DevServer,
    pub listener: TcpListener,
    pub addr: SocketAddr,
}

impl Started {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Allocate a port and build the server for `config`.
pub async fn start(config: DevServerConfig) -> Result<Started, StartupError> {
    for warning in warnings(&config) {
        tracing::warn!("{}", warning);
    }

    let host: IpAddr = config
        .listener
        .host
        .parse()
        .map_err(|_| StartupError::Host {
            host: config.listener.host.clone(),
        })?;

    let listener = PortAllocator::new(host, config.listener.port)
        .with_max_attempts(config.listener.max_port_attempts)
        .allocate()
        .await?;
    let addr = listener.local_addr().map_err(StartupError::Address)?;

    if addr.port() != config.listener.port {
        tracing::info!(
            requested = config.listener.port,
            bound = addr.port(),
            "Requested port was taken"
        );
    }

    let server = DevServer::new(config, LiveUpdateHub::default())?;
    Ok(Started {
        server,
        listener,
        addr,
    })
}
