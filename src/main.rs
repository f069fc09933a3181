//! Frontend development server.
//!
//! Serves the bundler's output, forwards API calls to a backend and pushes
//! rebuild notifications to connected browsers.
//!
//! # Architecture Overview
//!
//! ```text
//!     Browser request
//!     ───────────────▶ net::port (bound listener)
//!                          │
//!                          ▼
//!                      http::server (trace, request id, timeout)
//!                          │
//!                          ▼
//!                      http::chain
//!                          ├─▶ http::proxy ──────────▶ API backend
//!                          ├─▶ assets (build output)
//!                          ├─▶ live_update (SSE) ◀── assets::watcher
//!                          └─▶ 404
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use devserver::config::loader::load_or_default;
use devserver::config::validation::validate_config;
use devserver::config::Mode;
use devserver::lifecycle::{shutdown_signal, start, Shutdown};
use devserver::observability::{logging, metrics};

const DEFAULT_CONFIG: &str = "devserver.toml";

#[derive(Parser)]
#[command(name = "devserver")]
#[command(about = "Frontend development server with API proxy and live reload", long_about = None)]
struct Cli {
    /// Config file (defaults to ./devserver.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// First port to try
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// development or production
    #[arg(short, long)]
    mode: Option<Mode>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (path, explicit) = match cli.config {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };

    let mut config = match load_or_default(&path, explicit) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            tracing::error!(path = %path.display(), error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(host) = cli.host {
        config.listener.host = host;
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }

    logging::init(&config.observability.log_level);

    if let Err(errors) = validate_config(&config) {
        for error in errors {
            tracing::error!(%error, "Invalid configuration");
        }
        return ExitCode::FAILURE;
    }

    tracing::info!(
        mode = %config.mode,
        host = %config.listener.host,
        port = config.listener.port,
        proxies = config.proxies.len(),
        output = %config.assets.root,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let started = match start(config).await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(port = started.port(), address = %started.addr, "Project listening");

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    if let Err(e) = started.server.run(started.listener, rx).await {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
