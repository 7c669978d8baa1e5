//! Metrics collection and export for Rendezvous.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use rendezvous_core::Outcome;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "rendezvous_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "rendezvous_connections_active";
    pub const MESSAGES_TOTAL: &str = "rendezvous_messages_total";
    pub const MESSAGES_BYTES: &str = "rendezvous_messages_bytes";
    pub const MESSAGES_DROPPED_TOTAL: &str = "rendezvous_messages_dropped_total";
    pub const REJECTIONS_TOTAL: &str = "rendezvous_rejections_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "rendezvous_delivery_failures_total";
    pub const FANOUT_RECIPIENTS: &str = "rendezvous_fanout_recipients";
    pub const LATENCY_SECONDS: &str = "rendezvous_latency_seconds";
    pub const ERRORS_TOTAL: &str = "rendezvous_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of messages processed");
    metrics::describe_counter!(
        names::MESSAGES_DROPPED_TOTAL,
        "Inbound messages dropped as malformed"
    );
    metrics::describe_counter!(
        names::REJECTIONS_TOTAL,
        "Messages rejected by identity arbitration"
    );
    metrics::describe_counter!(
        names::DELIVERY_FAILURES_TOTAL,
        "Per-recipient delivery failures during fan-out"
    );
    metrics::describe_histogram!(
        names::FANOUT_RECIPIENTS,
        "Number of recipients selected per routed message"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Message processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a message.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record what the relay did with an inbound message.
pub fn record_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Dropped => counter!(names::MESSAGES_DROPPED_TOTAL).increment(1),
        Outcome::Rejected(reply) => {
            counter!(names::REJECTIONS_TOTAL, "reason" => reply.label()).increment(1);
        }
        Outcome::Routed(fan_out) => {
            histogram!(names::FANOUT_RECIPIENTS).record(fan_out.recipient_count() as f64);
            if !fan_out.dropped.is_empty() {
                counter!(names::DELIVERY_FAILURES_TOTAL, "kind" => "full")
                    .increment(fan_out.dropped.len() as u64);
            }
            if !fan_out.closed.is_empty() {
                counter!(names::DELIVERY_FAILURES_TOTAL, "kind" => "closed")
                    .increment(fan_out.closed.len() as u64);
            }
        }
    }
}

/// Record message latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
