//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, intervals)
//! - Check proxy targets and rewrite patterns compile
//! - Report the live-update heartbeat contract as a warning
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DevServerConfig → Result<(), Vec<ValidationError>>
//! - Operator contracts that are not enforced surface through `warnings`

use regex::Regex;
use url::Url;

use crate::config::schema::DevServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &DevServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::new("listener.port", "must be between 1 and 65535"));
    }
    if config.listener.host.parse::<std::net::IpAddr>().is_err() {
        errors.push(ValidationError::new("listener.host", "must be an IP address"));
    }
    if config.listener.max_port_attempts == Some(0) {
        errors.push(ValidationError::new("listener.max_port_attempts", "must be at least 1"));
    }

    for (i, rule) in config.proxies.iter().enumerate() {
        let field = |name: &str| format!("proxies[{}].{}", i, name);

        if !rule.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(field("path_prefix"), "must start with '/'"));
        }
        match Url::parse(&rule.target) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
            Ok(_) => errors.push(ValidationError::new(field("target"), "must be an http(s) origin")),
            Err(e) => errors.push(ValidationError::new(field("target"), e.to_string())),
        }
        for (j, rewrite) in rule.path_rewrite.iter().enumerate() {
            if let Err(e) = Regex::new(&rewrite.pattern) {
                errors.push(ValidationError::new(
                    format!("proxies[{}].path_rewrite[{}].pattern", i, j),
                    e.to_string(),
                ));
            }
        }
    }

    if !config.assets.public_path.starts_with('/') {
        errors.push(ValidationError::new("assets.public_path", "must start with '/'"));
    }
    if config.assets.index.is_empty() || config.assets.index.contains('/') {
        errors.push(ValidationError::new("assets.index", "must be a plain file name"));
    }

    let live = &config.live_update;
    if !live.path.starts_with('/') || live.path.len() < 2 {
        errors.push(ValidationError::new("live_update.path", "must start with '/' and name a path"));
    }
    if live.heartbeat_ms == 0 {
        errors.push(ValidationError::new("live_update.heartbeat_ms", "must be greater than 0"));
    }

    if config.timeouts.proxy_secs == 0 {
        errors.push(ValidationError::new("timeouts.proxy_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Non-fatal findings the operator should know about.
pub fn warnings(config: &DevServerConfig) -> Vec<String> {
    let mut out = Vec::new();

    let live = &config.live_update;
    if live.enabled && live.heartbeat_ms >= live.client_timeout_ms {
        out.push(format!(
            "live_update.heartbeat_ms ({}) is not below client_timeout_ms ({}); clients will drop the channel",
            live.heartbeat_ms, live.client_timeout_ms
        ));
    }

    let timeouts = &config.timeouts;
    if !config.proxies.is_empty() && timeouts.proxy_secs >= timeouts.request_secs {
        out.push(format!(
            "timeouts.proxy_secs ({}) is not below request_secs ({}); slow upstreams get 408 instead of 504",
            timeouts.proxy_secs, timeouts.request_secs
        ));
    }

    for rule in &config.proxies {
        if !rule.secure {
            out.push(format!(
                "TLS verification disabled for proxy {} -> {}",
                rule.path_prefix, rule.target
            ));
        }
    }

    out
}
