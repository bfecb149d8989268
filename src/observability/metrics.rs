//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, route, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - The server middleware stays sink-agnostic; [`register`] adapts it to
//!   the `metrics` facade
//! - Nothing is exported until [`init_metrics`] installs the recorder

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::http::middleware::MetricsRegister;

/// Serve Prometheus metrics on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one served request.
pub fn record_request(method: &str, route: &str, status: &str, elapsed: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels).record(elapsed.as_secs_f64());
}

/// [`record_request`] as a server metrics register.
pub fn register() -> MetricsRegister {
    Arc::new(record_request)
}
