//! Pooled HTTP connections.
//!
//! # Responsibilities
//! - Collect pool, keep-alive and timeout settings
//! - Build the shared `reqwest::Client` behind a `Transport`
//! - Report DNS resolutions through an optional dialer hook
//!
//! # Design Decisions
//! - Options are plain values; every `with_*` returns a modified copy
//! - Zero values fall back to sane defaults when the pool is built

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::{Certificate, Request, Response};

use crate::client::error::BoxError;
use crate::client::transport::Transport;

/// DNS resolution observed by the dialer hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialerHookEvent {
    pub msg: &'static str,
    pub error: Option<String>,
    pub host: String,
    pub lookups: Vec<IpAddr>,
}

pub type DialerHook = Arc<dyn Fn(DialerHookEvent) + Send + Sync>;

/// Connection pool options.
#[derive(Clone)]
pub struct ConnOptions {
    max_idle_conns: usize,
    keep_alive: Duration,
    conn_timeout: Duration,
    request_timeout: Duration,
    dialer_hook: Option<DialerHook>,
    root_certificates: Vec<Certificate>,
}

impl Default for ConnOptions {
    fn default() -> Self {
        Self {
            max_idle_conns: 5,
            keep_alive: Duration::from_secs(30),
            conn_timeout: Duration::from_secs(10),
            request_timeout: Duration::ZERO,
            dialer_hook: None,
            root_certificates: Vec::new(),
        }
    }
}

impl fmt::Debug for ConnOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnOptions")
            .field("max_idle_conns", &self.max_idle_conns)
            .field("keep_alive", &self.keep_alive)
            .field("conn_timeout", &self.conn_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("dialer_hook", &self.dialer_hook.is_some())
            .field("root_certificates", &self.root_certificates.len())
            .finish()
    }
}

impl ConnOptions {
    /// Maximum idle connections kept alive per host.
    ///
    /// Reduces new connections during bursts; pair it with a keep-alive as
    /// long as the period between bursts.
    pub fn with_max_idle_conns(mut self, value: usize) -> Self {
        self.max_idle_conns = value;
        self
    }

    /// How long an unused connection stays open; also the TCP keep-alive.
    pub fn with_keep_alive(mut self, value: Duration) -> Self {
        self.keep_alive = value;
        self
    }

    /// Timeout for establishing new connections.
    pub fn with_timeout(mut self, value: Duration) -> Self {
        self.conn_timeout = value;
        self
    }

    /// Overall timeout for every request. Zero disables it.
    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    /// Call `handler` on every DNS resolution the pool performs.
    pub fn with_dialer_hook<F>(mut self, handler: F) -> Self
    where
        F: Fn(DialerHookEvent) + Send + Sync + 'static,
    {
        self.dialer_hook = Some(Arc::new(handler));
        self
    }

    /// Trust `certificate` in addition to the system roots.
    pub fn with_root_certificate(mut self, certificate: Certificate) -> Self {
        self.root_certificates.push(certificate);
        self
    }

    pub fn max_idle_conns(&self) -> usize {
        self.max_idle_conns
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn conn_timeout(&self) -> Duration {
        self.conn_timeout
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn sanitize(mut self) -> Self {
        if self.keep_alive.is_zero() {
            self.keep_alive = Duration::from_secs(30);
        }
        if self.max_idle_conns == 0 {
            self.max_idle_conns = 5;
        }
        if self.conn_timeout.is_zero() {
            self.conn_timeout = Duration::from_secs(3);
        }
        self
    }
}

/// Pooled connection to any number of hosts.
#[derive(Debug, Clone)]
pub struct Conn {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl Conn {
    /// Build a pool from `opts`, filling unset values with defaults.
    pub fn new(opts: ConnOptions) -> Result<Self, reqwest::Error> {
        let opts = opts.sanitize();

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(opts.max_idle_conns)
            .pool_idle_timeout(opts.keep_alive)
            .tcp_keepalive(opts.keep_alive)
            .connect_timeout(opts.conn_timeout);

        let timeout = (!opts.request_timeout.is_zero()).then_some(opts.request_timeout);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(hook) = opts.dialer_hook {
            builder = builder.dns_resolver(Arc::new(HookResolver { hook }));
        }
        for certificate in opts.root_certificates {
            builder = builder.add_root_certificate(certificate);
        }

        Ok(Self {
            client: builder.build()?,
            timeout,
        })
    }

    /// The underlying pooled client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Transport for Conn {
    fn execute(&self, request: Request) -> BoxFuture<'static, Result<Response, BoxError>> {
        Transport::execute(&self.client, request)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// System resolver that reports every lookup to a hook.
struct HookResolver {
    hook: DialerHook,
}

impl Resolve for HookResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let hook = self.hook.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            let lookup = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map(|addrs| addrs.collect::<Vec<SocketAddr>>());
            match lookup {
                Ok(addrs) => {
                    hook(DialerHookEvent {
                        msg: "dns lookup",
                        error: None,
                        host,
                        lookups: addrs.iter().map(SocketAddr::ip).collect(),
                    });
                    let addrs: Addrs = Box::new(addrs.into_iter());
                    Ok(addrs)
                }
                Err(err) => {
                    hook(DialerHookEvent {
                        msg: "dns lookup failed",
                        error: Some(err.to_string()),
                        host,
                        lookups: Vec::new(),
                    });
                    Err(err.into())
                }
            }
        })
    }
}
