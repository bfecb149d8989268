//! HTTP server bootstrap.
//!
//! # Responsibilities
//! - Collect user routes plus health and admin routes
//! - Wrap them in the middleware stack
//! - Bind the address (plain or TLS) and serve until stopped
//!
//! # Design Decisions
//! - Routes are stateless `Router<()>`; handlers needing state call
//!   `with_state` before being merged
//! - `start` and `stop` share a lifecycle so a clonable handle can stop the
//!   server from within a handler

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Extensions, HeaderMap, Request, StatusCode, Version};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::compression::predicate::{DefaultPredicate, Predicate};
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeFile;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutBody, TimeoutLayer};

use crate::http::error::HttpError;
use crate::http::middleware::access_log::{log_access, AccessLogger, Discarder};
use crate::http::middleware::metrics::{track_metrics, MetricsRegister};
use crate::http::middleware::recover;

const BUILD_PROPERTIES: [&str; 2] = ["/etc/build.properties", "./build.properties"];

/// Returns true when a response must not be compressed.
pub type GzipSkipper = Arc<dyn Fn(&HeaderMap) -> bool + Send + Sync>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already running")]
    AlreadyRunning,

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("failed to load TLS certificates: {0}")]
    Tls(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// PEM encoded certificate chain and private key.
#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Server options. Zero durations disable the matching timeout.
#[derive(Clone, Default)]
pub struct ServerOptions {
    pub read_timeout: Duration,
    pub read_header_timeout: Duration,
    pub write_timeout: Duration,
    /// Grace period for in-flight requests on stop; unbounded when unset.
    pub shutdown_timeout: Option<Duration>,
    pub tls: Option<TlsFiles>,
    pub access_log_disabled: bool,
    pub access_log_discarder: Option<Discarder>,
    pub metrics: Option<MetricsRegister>,
    pub gzip_disabled: bool,
    pub gzip_skipper: Option<GzipSkipper>,
}

/// Running flag and shutdown handle, changed together under one lock so a
/// stop issued while the server is starting is never lost.
#[derive(Default)]
struct Lifecycle {
    running: AtomicBool,
    handle: Mutex<Option<axum_server::Handle>>,
}

impl Lifecycle {
    fn slot(&self) -> MutexGuard<'_, Option<axum_server::Handle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<axum_server::Handle> {
        self.slot().clone()
    }

    /// Mark the server running and install a fresh handle. `None` when it
    /// already runs.
    fn begin(&self) -> Option<axum_server::Handle> {
        let mut slot = self.slot();
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        let handle = axum_server::Handle::new();
        *slot = Some(handle.clone());
        Some(handle)
    }

    fn finish(&self) {
        let mut slot = self.slot();
        *slot = None;
        self.running.store(false, Ordering::SeqCst);
    }

    fn stop(&self, timeout: Option<Duration>) {
        let slot = self.slot();
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = slot.as_ref() {
            tracing::info!("webserver: stopping");
            handle.graceful_shutdown(timeout);
        }
    }
}

/// Clonable handle stopping a running server.
#[derive(Clone)]
pub struct ServerHandle {
    lifecycle: Arc<Lifecycle>,
    shutdown_timeout: Option<Duration>,
}

impl ServerHandle {
    /// Begin a graceful shutdown. No-op when the server is not running.
    pub fn stop(&self) {
        self.lifecycle.stop(self.shutdown_timeout);
    }
}

pub struct Server {
    address: String,
    options: ServerOptions,
    router: Router,
    lifecycle: Arc<Lifecycle>,
}

impl Server {
    pub fn new(address: impl Into<String>, options: ServerOptions) -> Self {
        Self {
            address: address.into(),
            options,
            router: Router::new(),
            lifecycle: Arc::new(Lifecycle::default()),
        }
    }

    pub fn route(&mut self, path: &str, method_router: MethodRouter) -> &mut Self {
        self.router = std::mem::take(&mut self.router).route(path, method_router);
        self
    }

    pub fn merge(&mut self, other: Router) -> &mut Self {
        self.router = std::mem::take(&mut self.router).merge(other);
        self
    }

    /// `GET <prefix>/health` and, when a build.properties file exists,
    /// `GET <prefix>/info`.
    pub fn register_health_routes(&mut self, prefix: &str) -> &mut Self {
        self.route(
            &prefixed(prefix, "/health"),
            get(|| async { Json(serde_json::Value::Null) }),
        );
        self.register_info_route(prefix, &BUILD_PROPERTIES)
    }

    /// `GET <prefix>/info` serves the first existing file of `candidates`.
    /// Nothing is registered when none exists.
    pub fn register_info_route<P: AsRef<Path>>(
        &mut self,
        prefix: &str,
        candidates: &[P],
    ) -> &mut Self {
        let found = candidates
            .iter()
            .map(AsRef::<Path>::as_ref)
            .find(|path| path.exists());
        if let Some(file) = found {
            self.router = std::mem::take(&mut self.router)
                .route_service(&prefixed(prefix, "/info"), ServeFile::new(file));
        }
        self
    }

    /// `POST <prefix>/admin/shutdown` answers 204 and stops the server.
    pub fn register_admin_routes(&mut self, prefix: &str) -> &mut Self {
        let handle = self.handle();
        self.route(
            &prefixed(prefix, "/admin/shutdown"),
            post(move || {
                let handle = handle.clone();
                async move {
                    handle.stop();
                    StatusCode::NO_CONTENT
                }
            }),
        )
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            lifecycle: self.lifecycle.clone(),
            shutdown_timeout: self.options.shutdown_timeout,
        }
    }

    /// The routes wrapped in the full middleware stack.
    #[allow(deprecated)]
    pub fn into_router(&self) -> Router {
        let options = &self.options;
        let mut router = self
            .router
            .clone()
            .fallback(|| async { HttpError::not_found() })
            .method_not_allowed_fallback(|| async { HttpError::method_not_allowed() });

        if !options.gzip_disabled {
            let skipper = options.gzip_skipper.clone();
            let predicate = DefaultPredicate::new().and(
                move |_: StatusCode, _: Version, headers: &HeaderMap, _: &Extensions| {
                    !skipper.as_ref().is_some_and(|skip| skip(headers))
                },
            );
            router = router.layer(CompressionLayer::new().gzip(true).compress_when(predicate));
        }

        router = router.layer(recover::layer());

        if !options.access_log_disabled {
            let logger = AccessLogger::new(options.access_log_discarder.clone());
            router = router.layer(from_fn_with_state(logger, log_access));
        }
        if let Some(register) = &options.metrics {
            router = router.layer(from_fn_with_state(register.clone(), track_metrics));
        }

        if !options.write_timeout.is_zero() {
            router = router.layer(TimeoutLayer::new(options.write_timeout));
        }
        if !options.read_timeout.is_zero() {
            router = router.layer(
                ServiceBuilder::new()
                    .layer(RequestBodyTimeoutLayer::new(options.read_timeout))
                    .map_request(|request: Request<TimeoutBody<Body>>| request.map(Body::new)),
            );
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Bind and serve until [`Server::stop`] is called.
    pub async fn start(&self) -> Result<(), ServerError> {
        let addr = resolve_address(&self.address).await?;
        let tls = match &self.options.tls {
            Some(tls) => Some(
                RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
                    .await
                    .map_err(ServerError::Tls)?,
            ),
            None => None,
        };
        let Some(handle) = self.lifecycle.begin() else {
            return Err(ServerError::AlreadyRunning);
        };

        let result = self.serve(addr, tls, handle).await;

        self.lifecycle.finish();
        result
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    /// Bound address, once the server is listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.current()?.listening().await
    }

    async fn serve(
        &self,
        addr: SocketAddr,
        tls: Option<RustlsConfig>,
        handle: axum_server::Handle,
    ) -> Result<(), ServerError> {
        let app = self
            .into_router()
            .into_make_service_with_connect_info::<SocketAddr>();

        tracing::info!(address = %addr, tls = tls.is_some(), "webserver: starting");

        match tls {
            Some(config) => {
                let mut server = axum_server::bind_rustls(addr, config).handle(handle);
                self.tune(server.http_builder());
                server.serve(app).await?;
            }
            None => {
                let mut server = axum_server::bind(addr).handle(handle);
                self.tune(server.http_builder());
                server.serve(app).await?;
            }
        }

        tracing::info!(address = %addr, "webserver: stopped");
        Ok(())
    }

    fn tune(&self, builder: &mut ConnBuilder<TokioExecutor>) {
        if !self.options.read_header_timeout.is_zero() {
            builder
                .http1()
                .timer(TokioTimer::new())
                .header_read_timeout(self.options.read_header_timeout);
        }
    }
}

fn prefixed(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("/{prefix}{path}")
    }
}

/// `:port` listens on every interface.
async fn resolve_address(address: &str) -> Result<SocketAddr, ServerError> {
    let address = if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    };
    let resolved = match tokio::net::lookup_host(address.as_str()).await {
        Ok(mut addrs) => addrs.next(),
        Err(_) => None,
    };
    resolved.ok_or(ServerError::InvalidAddress(address))
}
