//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sampler_requests_total` (counter): proxied requests by method, status
//! - `sampler_request_duration_seconds` (histogram): proxy latency
//! - `sampler_observations_total` (counter): processed observations by outcome
//! - `sampler_observations_dropped_total` (counter): queue drops by reason
//! - `sampler_observation_failures_total` (counter): abandoned observations by kind
//! - `sampler_fingerprint_duration_seconds` (histogram): fingerprint wall time
//! - `sampler_fingerprint_slow_total` (counter): fingerprints over budget
//!
//! # Design Decisions
//! - Label values are small closed sets (method, status, outcome, reason, kind)
//! - The exporter is optional; without it every call is a cheap no-op

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one proxied request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "sampler_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("sampler_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record a processed observation. `outcome` is new_shape, sampled or counted.
pub fn record_observation(outcome: &'static str) {
    counter!("sampler_observations_total", "outcome" => outcome).increment(1);
}

/// Record an observation dropped before processing.
pub fn record_dropped(reason: &'static str) {
    counter!("sampler_observations_dropped_total", "reason" => reason).increment(1);
}

/// Record an observation abandoned during processing.
pub fn record_failure(kind: &'static str) {
    counter!("sampler_observation_failures_total", "kind" => kind).increment(1);
}

pub fn record_fingerprint(elapsed: Duration, over_budget: bool) {
    histogram!("sampler_fingerprint_duration_seconds").record(elapsed.as_secs_f64());
    if over_budget {
        counter!("sampler_fingerprint_slow_total").increment(1);
    }
}
