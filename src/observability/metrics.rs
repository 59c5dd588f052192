//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, mount
//! - `proxy_request_duration_seconds` (histogram): time until response head
//! - `proxy_multipart_spooled_total` (counter): parts spooled to disk
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one forwarded request.
pub fn record_request(method: &str, status: u16, mount: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("mount", mount.to_string()),
    ];
    metrics::counter!("proxy_requests_total", &labels).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_spooled_part() {
    metrics::counter!("proxy_multipart_spooled_total").increment(1);
}
