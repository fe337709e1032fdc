//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_request` (counter): user requests by `response_code`
//! - `gateway_node_connections` (gauge): live node sessions by `routing_key`
//!
//! # Design Decisions
//! - The gateway records through the injected `MetricsSink`, so tests can
//!   count outcomes without a global recorder
//! - Without an installed exporter the `metrics` macros are no-ops

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::api::ErrorCode;

pub const REQUEST_COUNTER: &str = "gateway_request";
pub const NODE_CONNECTIONS_GAUGE: &str = "gateway_node_connections";

/// Outcome sink for user requests.
pub trait MetricsSink: Send + Sync {
    fn record_request(&self, code: ErrorCode);
}

/// Sink backed by the global `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl MetricsSink for PrometheusMetrics {
    fn record_request(&self, code: ErrorCode) {
        metrics::counter!(REQUEST_COUNTER, "response_code" => code.as_str()).increment(1);
    }
}

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Report the node session count of one routing key.
pub fn record_node_connections(routing_key: &str, count: usize) {
    metrics::gauge!(NODE_CONNECTIONS_GAUGE, "routing_key" => routing_key.to_string()).set(count as f64);
}
