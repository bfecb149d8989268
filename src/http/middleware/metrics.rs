//! Request metrics middleware.
//!
//! Reports `(method, route, status, elapsed)` for every request to a
//! caller-provided register, so the sink stays pluggable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

/// Receives `(method, route, status, elapsed)` once per request.
pub type MetricsRegister = Arc<dyn Fn(&str, &str, &str, Duration) + Send + Sync>;

pub const ROUTE_NOT_FOUND: &str = "ENOTFOUND";
pub const ROUTE_METHOD_NOT_ALLOWED: &str = "EMETHODNOTALLOWED";

pub async fn track_metrics(
    State(register): State<MetricsRegister>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let matched = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string());

    let response = next.run(request).await;
    let elapsed = start.elapsed();

    let status = response.status();
    let route = route_label(status, matched.as_deref());
    register(&method, route, status.as_str(), elapsed);

    response
}

/// Unmatched requests are grouped under sentinel labels instead of their
/// raw path, keeping label cardinality bounded.
fn route_label(status: StatusCode, matched: Option<&str>) -> &str {
    match (status, matched) {
        (StatusCode::METHOD_NOT_ALLOWED, _) => ROUTE_METHOD_NOT_ALLOWED,
        (_, Some(route)) => route,
        (StatusCode::NOT_FOUND, None) => ROUTE_NOT_FOUND,
        (_, None) => "",
    }
}
