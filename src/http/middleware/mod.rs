//! Server middleware stack.
//!
//! # Data Flow
//! ```text
//! request-id -> timeouts -> metrics -> access log -> recover -> gzip -> handler
//! ```

pub mod access_log;
pub mod metrics;
pub mod recover;

pub use access_log::{AccessLogDiscarder, AccessLogLevel, AccessLogger, Discarder};
pub use metrics::MetricsRegister;
