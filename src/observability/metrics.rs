//! Metrics collection and exposition.
//!
//! # Metrics
//! - `devserver_requests_total` (counter): requests by handling middleware, status
//! - `devserver_request_duration_seconds` (histogram): latency by middleware
//! - `devserver_upstream_requests_total` (counter): proxied requests by prefix, status
//! - `devserver_upstream_duration_seconds` (histogram): upstream round trip by prefix
//! - `devserver_live_update_clients` (gauge): connected live-update clients
//! - `devserver_builds_total` (counter): completed rebuild notifications

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a request answered by the chain. `handler` is "none" for 404s.
pub fn record_request(handler: &str, status: u16, start: Instant) {
    counter!(
        "devserver_requests_total",
        "handler" => handler.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("devserver_request_duration_seconds", "handler" => handler.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a proxied round trip.
pub fn record_upstream(prefix: &str, status: u16, start: Instant) {
    counter!(
        "devserver_upstream_requests_total",
        "prefix" => prefix.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("devserver_upstream_duration_seconds", "prefix" => prefix.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn set_live_clients(count: u64) {
    gauge!("devserver_live_update_clients").set(count as f64);
}

pub fn record_build() {
    counter!("devserver_builds_total").increment(1);
}
