//! Web service toolkit.
//!
//! Building blocks for HTTP services that call other HTTP services.
//!
//! # Architecture Overview
//!
//! ```text
//!     Inbound request                                         Upstream
//!     ──────────────▶ http::server ──▶ middleware ──▶ handler ──┐
//!                     (bind, TLS,      (request id,             │
//!                      lifecycle)       timeouts, metrics,      ▼
//!                                       access log, recover,  client::Client
//!                                       gzip)                   │ new_stream_request
//!                                                               │ new_request
//!                                                               │ new_json_request
//!                                                               ▼
//!                                                             Transport (Conn pool)
//!
//!     config (TOML) ──▶ ServerOptions / ClientOptions
//!     observability ──▶ tracing subscriber, Prometheus recorder
//! ```
//!
//! # Client builders
//!
//! Builders are immutable: every `with_*` call returns a new builder and
//! leaves the receiver untouched, so a base builder can be shared across
//! tasks and specialised per call.

pub mod client;
pub mod config;
pub mod http;
pub mod observability;

pub use client::{Client, ClientError, ClientOptions, ClientResult, Context};
pub use config::ServiceConfig;
pub use http::{HttpError, Server, ServerOptions};
