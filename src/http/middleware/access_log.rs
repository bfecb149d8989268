//! Access log middleware.
//!
//! # Responsibilities
//! - Emit one structured event per request, after the response is known
//! - Skip requests a discarder rejects
//!
//! # Design Decisions
//! - Events use the `access` target so they can be filtered separately
//! - 5xx responses and handler errors are logged at error level

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::HttpBody;
use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::http::error::ErrorMessage;

/// Returns true when a request must not be logged.
pub type Discarder = Arc<dyn Fn(StatusCode, &str) -> bool + Send + Sync>;

const X_REQUEST_ID: &str = "x-request-id";
const X_TAGS: &str = "x-tags";

/// Minimum severity of requests written to the access log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLogLevel {
    /// Every status code.
    #[default]
    Verbose,
    /// Everything except 3xx and 404.
    Info,
    /// Only 4xx (except 404) and 5xx.
    Warn,
    /// Only 5xx.
    Error,
}

/// Status and route based discarder.
#[derive(Debug, Clone)]
pub struct AccessLogDiscarder {
    pub level: AccessLogLevel,
    pub ignore_routes: Option<Regex>,
}

impl AccessLogDiscarder {
    pub fn new(level: AccessLogLevel, ignore_routes: Option<Regex>) -> Self {
        Self {
            level,
            ignore_routes,
        }
    }

    pub fn discard(&self, status: StatusCode, path: &str) -> bool {
        let status = status.as_u16();
        let filtered = match self.level {
            AccessLogLevel::Error => status < 500,
            AccessLogLevel::Warn => status == 404 || status < 400,
            AccessLogLevel::Info => status == 404 || (300..400).contains(&status),
            AccessLogLevel::Verbose => false,
        };
        if filtered {
            return true;
        }
        self.ignore_routes
            .as_ref()
            .is_some_and(|routes| routes.is_match(path))
    }

    pub fn into_discarder(self) -> Discarder {
        Arc::new(move |status: StatusCode, path: &str| self.discard(status, path))
    }
}

/// State of the access log middleware.
#[derive(Clone, Default)]
pub struct AccessLogger {
    discarder: Option<Discarder>,
}

impl AccessLogger {
    pub fn new(discarder: Option<Discarder>) -> Self {
        Self { discarder }
    }

    fn discard(&self, status: StatusCode, path: &str) -> bool {
        self.discarder
            .as_ref()
            .is_some_and(|discard| discard(status, path))
    }
}

/// Request fields captured before the handler consumes the request.
#[derive(Debug)]
struct Entry {
    id: String,
    path: String,
    method: String,
    uri: String,
    bytes_in: u64,
    remote_ip: Vec<String>,
    host: String,
    referer: String,
    ua: String,
    route: String,
    tags: Vec<String>,
}

impl Entry {
    fn capture(request: &Request) -> Self {
        let headers = request.headers();
        let path = request.uri().path();
        Self {
            id: header_str(headers, X_REQUEST_ID).to_string(),
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            method: request.method().to_string(),
            uri: request.uri().to_string(),
            bytes_in: content_length(headers),
            remote_ip: remote_ip(request),
            host: header_str(headers, header::HOST.as_str()).to_string(),
            referer: header_str(headers, header::REFERER.as_str()).to_string(),
            ua: header_str(headers, header::USER_AGENT.as_str()).to_string(),
            route: request
                .extensions()
                .get::<MatchedPath>()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
            tags: headers
                .get_all(X_TAGS)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(String::from)
                .collect(),
        }
    }
}

macro_rules! access_event {
    ($level:expr, $entry:ident, $status:expr, $bytes_out:expr, $latency:expr, $($msg:tt)+) => {
        tracing::event!(
            target: "access",
            $level,
            id = %$entry.id,
            path = %$entry.path,
            method = %$entry.method,
            uri = %$entry.uri,
            bytes_in = $entry.bytes_in,
            bytes_out = $bytes_out,
            remote_ip = ?$entry.remote_ip,
            status = $status,
            host = %$entry.host,
            referer = %$entry.referer,
            ua = %$entry.ua,
            route = %$entry.route,
            latency_ns = $latency,
            tags = ?$entry.tags,
            $($msg)+
        )
    };
}

/// Log every request passing through.
pub async fn log_access(
    State(logger): State<AccessLogger>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let mut entry = Entry::capture(&request);

    let response = next.run(request).await;
    let latency = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);

    let status = response.status();
    if logger.discard(status, &entry.path) {
        return response;
    }

    if entry.id.is_empty() {
        entry.id = header_str(response.headers(), X_REQUEST_ID).to_string();
    }
    let bytes_out = match content_length(response.headers()) {
        0 => response.body().size_hint().exact().unwrap_or(0),
        n => n,
    };
    let code = status.as_u16();

    if let Some(ErrorMessage(message)) = response.extensions().get::<ErrorMessage>() {
        if status.is_server_error() || status.is_client_error() {
            access_event!(tracing::Level::ERROR, entry, code, bytes_out, latency,
                "{} {}: {}", entry.method, entry.uri, message);
            return response;
        }
    }
    if status.is_server_error() {
        access_event!(tracing::Level::ERROR, entry, code, bytes_out, latency,
            "{} {}", entry.method, entry.uri);
    } else {
        access_event!(tracing::Level::INFO, entry, code, bytes_out, latency,
            "{} {}", entry.method, entry.uri);
    }

    response
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn content_length(headers: &HeaderMap) -> u64 {
    header_str(headers, header::CONTENT_LENGTH.as_str())
        .parse()
        .unwrap_or(0)
}

/// Client addresses: `X-Forwarded-For` list, `X-Real-IP`, then the peer.
fn remote_ip(request: &Request) -> Vec<String> {
    let headers = request.headers();
    let forwarded = header_str(headers, "x-forwarded-for");
    if !forwarded.is_empty() {
        return forwarded.split(',').map(|ip| ip.trim().to_string()).collect();
    }
    let real = header_str(headers, "x-real-ip");
    if !real.is_empty() {
        return vec![real.to_string()];
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| vec![addr.ip().to_string()])
        .unwrap_or_default()
}
