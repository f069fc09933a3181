//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dev server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the dev server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DevServerConfig {
    /// Build profile the server runs in.
    pub mode: Mode,

    /// Listener configuration (host, starting port).
    pub listener: ListenerConfig,

    /// API reverse-proxy rules, matched in the order given.
    pub proxies: Vec<ProxyRule>,

    /// Build-output serving.
    pub assets: AssetsConfig,

    /// Live-update (HMR) channel.
    pub live_update: LiveUpdateConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Build profile.
///
/// Production serves the output directory as-is: no live-update channel,
/// no watcher, long-lived caching for content-hashed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => f.write_str("development"),
            Mode::Production => f.write_str("production"),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// First port to try. Occupied ports are skipped upward.
    pub port: u16,

    /// Upper bound on bind attempts. `None` retries until a port frees up.
    pub max_port_attempts: Option<u32>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_port_attempts: None,
        }
    }
}

/// A single API reverse-proxy rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyRule {
    /// Path prefix to match (e.g., "/api").
    pub path_prefix: String,

    /// Target origin (e.g., "https://10.0.0.5:8080").
    pub target: String,

    /// Rewrites applied to the path before forwarding, in order.
    #[serde(default)]
    pub path_rewrite: Vec<PathRewrite>,

    /// Verify the target's TLS certificate.
    /// Turning this off has to be written out in the config.
    #[serde(default = "default_secure")]
    pub secure: bool,

    /// Replace the Host header with the target's authority.
    #[serde(default)]
    pub change_origin: bool,
}

fn default_secure() -> bool {
    true
}

/// Regex-based path rewrite (e.g., `^/api` → `""`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathRewrite {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

/// Build-output serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory the bundler writes its artifacts to.
    pub root: String,

    /// URL prefix the artifacts are served under.
    pub public_path: String,

    /// Serve from an in-memory snapshot instead of reading disk per request.
    pub in_memory: bool,

    /// Watch `root` and notify live-update clients on rewrite.
    pub watch: bool,

    /// File served for directory requests.
    pub index: String,

    /// Quiet period collapsing a burst of file events into one rebuild.
    pub debounce_ms: u64,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: "dist".to_string(),
            public_path: "/".to_string(),
            in_memory: true,
            watch: true,
            index: "index.html".to_string(),
            debounce_ms: 100,
        }
    }
}

/// Live-update channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LiveUpdateConfig {
    /// Enable the channel (development mode only).
    pub enabled: bool,

    /// Channel path. Must match the path the client script connects to.
    pub path: String,

    /// Heartbeat interval in milliseconds.
    /// Must stay below `client_timeout_ms`, conventionally about half.
    pub heartbeat_ms: u64,

    /// Silence after which the client considers the channel dead.
    pub client_timeout_ms: u64,

    /// Ask the client to reload the page when a build completes.
    pub reload: bool,
}

impl Default for LiveUpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/__hmr".to_string(),
            heartbeat_ms: 5000,
            client_timeout_ms: 10_000,
            reload: true,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the upstream to produce response headers, in seconds.
    pub proxy_secs: u64,

    /// Time allowed for any handler to produce a response, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            proxy_secs: 30,
            request_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
