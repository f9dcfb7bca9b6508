//! Metrics collection and exposition.
//!
//! # Metrics
//! - `heavy_messages_total` (counter): classified messages by leg, decision
//! - `heavy_handoffs_total` (counter): finished sessions by role, outcome
//! - `heavy_handoff_duration_seconds` (histogram): session latency by role
//! - `heavy_bytes_total` (counter): payload bytes moved by role
//! - `heavy_exchange_objects` (gauge): payloads held by the object store

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::handoff::SessionRole;
use crate::protocol::{Decision, Leg};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_message(leg: Leg, decision: Decision) {
    counter!(
        "heavy_messages_total",
        "leg" => leg.as_str(),
        "decision" => decision.as_str()
    )
    .increment(1);
}

pub fn record_handoff(role: SessionRole, outcome: &'static str, started: Instant) {
    counter!("heavy_handoffs_total", "role" => role.as_str(), "outcome" => outcome).increment(1);
    histogram!("heavy_handoff_duration_seconds", "role" => role.as_str())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_handoff_bytes(role: SessionRole, bytes: u64) {
    counter!("heavy_bytes_total", "role" => role.as_str()).increment(bytes);
}

pub fn record_stored_objects(count: usize) {
    gauge!("heavy_exchange_objects").set(count as f64);
}
