//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hostmap_reloads_total` (counter): live-map file events by outcome
//! - `hostmap_records` (gauge): records currently held, per watched directory
//! - `hostmap_resolutions_total` (counter): resolver outcomes
//! - `hostmap_access_decisions_total` (counter): allow/deny results
//!
//! Recording goes through the `metrics` facade and is a no-op until an
//! exporter is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_reload(outcome: &'static str) {
    metrics::counter!("hostmap_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_map_size(map: &str, size: usize) {
    metrics::gauge!("hostmap_records", "map" => map.to_string()).set(size as f64);
}

pub fn record_resolution(outcome: &'static str) {
    metrics::counter!("hostmap_resolutions_total", "outcome" => outcome).increment(1);
}

pub fn record_access_decision(decision: &'static str) {
    metrics::counter!("hostmap_access_decisions_total", "decision" => decision).increment(1);
}
