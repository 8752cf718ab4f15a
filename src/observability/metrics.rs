//! Metrics collection and exposition.
//!
//! # Metrics
//! - `l7lb_requests_total` (counter): requests by method, status, backend
//! - `l7lb_request_duration_seconds` (histogram): latency distribution
//! - `l7lb_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `l7lb_health_transitions_total` (counter): published state changes
//! - `l7lb_retries_total` (counter): upstream retry attempts per group
//! - `l7lb_rate_limited_total` (counter): rejected admissions
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed, so tests and
//!   `--check` runs never need one

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

const DURATION_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .upkeep_timeout(Duration::from_secs(5 * 60))
        .set_buckets_for_metric(
            Matcher::Full("l7lb_request_duration_seconds".to_string()),
            &DURATION_BUCKETS,
        )?
        .install()?;

    describe_counter!("l7lb_requests_total", "Proxied requests by method, status and backend");
    describe_histogram!("l7lb_request_duration_seconds", "End-to-end request latency");
    describe_gauge!("l7lb_backend_health", "Backend health as seen by the checker (1=healthy)");
    describe_counter!("l7lb_health_transitions_total", "Published backend health transitions");
    describe_counter!("l7lb_retries_total", "Upstream retry attempts");
    describe_counter!("l7lb_rate_limited_total", "Requests rejected by the rate limiter");

    tracing::info!(address = %addr, "Prometheus metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, backend: &str, started: Instant) {
    counter!(
        "l7lb_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!("l7lb_request_duration_seconds", "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_backend_health(backend: &str, healthy: bool) {
    gauge!("l7lb_backend_health", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_health_transition(backend: &str, healthy: bool) {
    let to = if healthy { "healthy" } else { "unhealthy" };
    counter!(
        "l7lb_health_transitions_total",
        "backend" => backend.to_string(),
        "to" => to
    )
    .increment(1);
}

pub fn record_retry(group: &str) {
    counter!("l7lb_retries_total", "group" => group.to_string()).increment(1);
}

pub fn record_rate_limited(reason: &'static str) {
    counter!("l7lb_rate_limited_total", "reason" => reason).increment(1);
}
