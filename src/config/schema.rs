//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every section has defaults so a minimal (or empty) file is valid.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::{ClientOptions, Conn, ConnOptions, Transport};
use crate::http::middleware::{AccessLogDiscarder, AccessLogLevel, MetricsRegister};
use crate::http::{ServerOptions, TlsFiles};

/// Root configuration of a service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener and timeouts.
    pub server: ServerConfig,

    /// Access log middleware.
    pub access_log: AccessLogConfig,

    /// Response compression.
    pub compression: CompressionConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Outbound client used by relay routes.
    pub client: ClientConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address; `:port` listens on every interface.
    pub bind_address: String,

    /// Prefix of the health and admin routes.
    pub route_prefix: String,

    /// Request body read timeout in seconds (0 disables).
    pub read_timeout_secs: u64,

    /// HTTP/1 header read timeout in seconds (0 disables).
    pub read_header_timeout_secs: u64,

    /// Handler timeout in seconds (0 disables).
    pub write_timeout_secs: u64,

    /// Grace period for in-flight requests on shutdown.
    pub shutdown_timeout_secs: u64,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: ":8080".to_string(),
            route_prefix: "_".to_string(),
            read_timeout_secs: 0,
            read_header_timeout_secs: 0,
            write_timeout_secs: 0,
            shutdown_timeout_secs: 10,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    pub enabled: bool,

    /// Minimum severity written.
    pub level: AccessLogLevel,

    /// Regex of request paths never logged.
    pub ignore_routes: Option<String>,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: AccessLogLevel::Verbose,
            ignore_routes: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub gzip: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { gzip: true }
    }
}

/// Output format of log events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins.
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL requests are sent to.
    pub base_url: String,

    /// Default request timeout in seconds.
    pub timeout_secs: u64,

    pub max_idle_conns: usize,

    pub keep_alive_secs: u64,

    pub connect_timeout_secs: u64,

    /// Headers added to every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            timeout_secs: 5,
            max_idle_conns: 5,
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            headers: BTreeMap::new(),
        }
    }
}

impl ServiceConfig {
    /// Server options described by this config. `metrics` is installed as
    /// the metrics register when given.
    pub fn server_options(&self, metrics: Option<MetricsRegister>) -> ServerOptions {
        let server = &self.server;
        let discarder = AccessLogDiscarder::new(
            self.access_log.level,
            self.access_log
                .ignore_routes
                .as_deref()
                .and_then(|routes| Regex::new(routes).ok()),
        );
        ServerOptions {
            read_timeout: Duration::from_secs(server.read_timeout_secs),
            read_header_timeout: Duration::from_secs(server.read_header_timeout_secs),
            write_timeout: Duration::from_secs(server.write_timeout_secs),
            shutdown_timeout: Some(Duration::from_secs(server.shutdown_timeout_secs)),
            tls: server.tls.as_ref().map(|tls| TlsFiles {
                cert_file: PathBuf::from(&tls.cert_path),
                key_file: PathBuf::from(&tls.key_path),
            }),
            access_log_disabled: !self.access_log.enabled,
            access_log_discarder: Some(discarder.into_discarder()),
            metrics,
            gzip_disabled: !self.compression.gzip,
            gzip_skipper: None,
        }
    }
}

impl ClientConfig {
    pub fn conn_options(&self) -> ConnOptions {
        ConnOptions::default()
            .with_max_idle_conns(self.max_idle_conns)
            .with_keep_alive(Duration::from_secs(self.keep_alive_secs))
            .with_timeout(Duration::from_secs(self.connect_timeout_secs))
    }

    /// Client options over a pooled connection built from this config.
    pub fn client_options(&self) -> Result<ClientOptions, reqwest::Error> {
        let conn: Arc<dyn Transport> = Arc::new(Conn::new(self.conn_options())?);
        Ok(ClientOptions::default()
            .with_conn(conn)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .add_headers(self.headers.clone()))
    }
}
