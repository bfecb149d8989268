//! HTTP server subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (bind, lifecycle, route table)
//!     → middleware/ (request id, timeouts, metrics, access log, recover, gzip)
//!     → handler
//!     → error.rs (HttpError rendered as JSON)
//! ```

pub mod error;
pub mod middleware;
pub mod server;

pub use error::HttpError;
pub use server::{Server, ServerError, ServerHandle, ServerOptions, TlsFiles};
