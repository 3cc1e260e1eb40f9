//! Metrics collection and exposition.
//!
//! # Metrics
//! - `smtp_connections_total` (counter): accepted TCP connections
//! - `smtp_connections_rejected_total` (counter): connections turned away by admission control
//! - `smtp_active_sessions` (gauge): sessions currently running
//! - `smtp_commands_total` (counter): commands by verb
//! - `smtp_messages_total` (counter): finished transactions by outcome
//! - `smtp_message_size_bytes` (histogram): accepted message sizes
//! - `smtp_queue_depth` (gauge): messages waiting for a worker
//! - `smtp_queue_store_total` (counter): worker store results by outcome
//!
//! All recorders are no-ops until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted() {
    counter!("smtp_connections_total").increment(1);
}

pub fn record_connection_rejected() {
    counter!("smtp_connections_rejected_total").increment(1);
}

pub fn record_session_started() {
    gauge!("smtp_active_sessions").increment(1.0);
}

pub fn record_session_finished() {
    gauge!("smtp_active_sessions").decrement(1.0);
}

pub fn record_command(verb: &'static str) {
    counter!("smtp_commands_total", "command" => verb).increment(1);
}

pub fn record_message(outcome: &'static str, size: usize) {
    counter!("smtp_messages_total", "outcome" => outcome).increment(1);
    if outcome == "accepted" {
        histogram!("smtp_message_size_bytes").record(size as f64);
    }
}

pub fn record_queue_depth(depth: usize) {
    gauge!("smtp_queue_depth").set(depth as f64);
}

pub fn record_queue_store(outcome: &'static str) {
    counter!("smtp_queue_store_total", "outcome" => outcome).increment(1);
}
