//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway and breaker metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_breaker_calls_total` (counter): guarded calls by breaker, outcome
//!   (`success`, `failure`, `slow`, `rejected`)
//! - `gateway_breaker_transitions_total` (counter): state changes by breaker, from, to
//! - `gateway_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_fallbacks_total` (counter): fallback dispatches by breaker, reason
//! - `gateway_breakers` (gauge): live breakers in the registry
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, which keeps tests free of setup
//! - Low-overhead metric updates (atomic operations)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    let labels = [
        ("route", route.to_string()),
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("gateway_requests_total", &labels).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_call(breaker: &str, outcome: &'static str) {
    metrics::counter!(
        "gateway_breaker_calls_total",
        "breaker" => breaker.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Count a transition and move the state gauge.
pub fn record_breaker_transition(breaker: &str, from: &'static str, to: &'static str) {
    metrics::counter!(
        "gateway_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from,
        "to" => to
    )
    .increment(1);
    record_breaker_state(breaker, to);
}

pub fn record_breaker_state(breaker: &str, state: &'static str) {
    let value = match state {
        "open" => 1.0,
        "half_open" => 2.0,
        _ => 0.0,
    };
    metrics::gauge!("gateway_breaker_state", "breaker" => breaker.to_string()).set(value);
}

pub fn record_fallback(breaker: &str, reason: &'static str) {
    metrics::counter!(
        "gateway_fallbacks_total",
        "breaker" => breaker.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_registry_size(breakers: usize) {
    metrics::gauge!("gateway_breakers").set(breakers as f64);
}
