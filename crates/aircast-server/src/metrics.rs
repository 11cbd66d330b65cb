//! Metrics collection and export for aircast.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "aircast_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "aircast_connections_active";
    pub const MESSAGES_TOTAL: &str = "aircast_messages_total";
    pub const MESSAGES_BYTES: &str = "aircast_messages_bytes";
    pub const FRAMES_RELAYED_TOTAL: &str = "aircast_frames_relayed_total";
    pub const FRAMES_DROPPED_TOTAL: &str = "aircast_frames_dropped_total";
    pub const LISTENERS_ACTIVE: &str = "aircast_listeners_active";
    pub const EVICTIONS_TOTAL: &str = "aircast_evictions_total";
    pub const ERRORS_TOTAL: &str = "aircast_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::MESSAGES_TOTAL,
        "Total number of control messages processed"
    );
    metrics::describe_counter!(
        names::MESSAGES_BYTES,
        "Total bytes of control messages processed"
    );
    metrics::describe_counter!(
        names::FRAMES_RELAYED_TOTAL,
        "Total binary frame deliveries enqueued to listeners"
    );
    metrics::describe_counter!(
        names::FRAMES_DROPPED_TOTAL,
        "Total queued frames dropped from slow listeners"
    );
    metrics::describe_gauge!(names::LISTENERS_ACTIVE, "Current number of listeners");
    metrics::describe_counter!(
        names::EVICTIONS_TOTAL,
        "Total connections evicted by the heartbeat"
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

/// Record a control message.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record a relayed binary frame: deliveries enqueued and stale frames
/// dropped to make room.
pub fn record_relay(recipients: usize, dropped: usize) {
    counter!(names::FRAMES_RELAYED_TOTAL).increment(recipients as u64);
    if dropped > 0 {
        counter!(names::FRAMES_DROPPED_TOTAL).increment(dropped as u64);
    }
}

/// Update the active listener count.
pub fn set_active_listeners(count: usize) {
    gauge!(names::LISTENERS_ACTIVE).set(count as f64);
}

/// Record a heartbeat eviction.
pub fn record_eviction() {
    counter!(names::EVICTIONS_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
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
