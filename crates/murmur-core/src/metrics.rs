//! Metric names and recording helpers.
//!
//! Recording goes through the `metrics` facade and is a no-op until the
//! server installs an exporter.

use metrics::{counter, gauge, histogram};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "murmur_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "murmur_connections_active";
    pub const SESSIONS_REGISTERED: &str = "murmur_sessions_registered";
    pub const MESSAGES_TOTAL: &str = "murmur_messages_total";
    pub const MESSAGES_BYTES: &str = "murmur_messages_bytes";
    pub const EVICTIONS_TOTAL: &str = "murmur_evictions_total";
    pub const STORE_REQUESTS_TOTAL: &str = "murmur_store_requests_total";
    pub const STORE_LATENCY_SECONDS: &str = "murmur_store_latency_seconds";
    pub const ERRORS_TOTAL: &str = "murmur_errors_total";
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

/// Update the number of sessions in the registry.
pub fn set_registered_sessions(count: usize) {
    gauge!(names::SESSIONS_REGISTERED).set(count as f64);
}

/// Record a message.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record sessions evicted after failed sends.
pub fn record_evictions(count: usize) {
    counter!(names::EVICTIONS_TOTAL).increment(count as u64);
}

/// Record a call to the external store.
pub fn record_store_request(operation: &'static str, outcome: &'static str, seconds: f64) {
    counter!(names::STORE_REQUESTS_TOTAL, "operation" => operation, "outcome" => outcome)
        .increment(1);
    histogram!(names::STORE_LATENCY_SECONDS, "operation" => operation).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}
