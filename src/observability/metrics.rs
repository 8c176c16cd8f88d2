//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): relay responses by status
//! - `edge_request_duration_seconds` (histogram): relay latency
//! - `edge_rate_limited_total` (counter): requests refused by the limiter
//! - `edge_challenge_total` (counter): verification outcomes
//! - `edge_upstream_total` (counter): upstream call outcomes
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so the
//! library and its tests can call these freely.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished relay request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "edge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("edge_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record a request refused by a limiter.
pub fn record_rate_limited(reason: &'static str) {
    counter!("edge_rate_limited_total", "reason" => reason).increment(1);
}

/// Record a challenge verification outcome (`passed`, `failed`, `skipped`, `missing`).
pub fn record_challenge(outcome: &'static str) {
    counter!("edge_challenge_total", "outcome" => outcome).increment(1);
}

/// Record an upstream outcome (`ok`, `timeout`, `malformed`, `error`).
pub fn record_upstream(outcome: &'static str) {
    counter!("edge_upstream_total", "outcome" => outcome).increment(1);
}
