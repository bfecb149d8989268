//! HTTP client subsystem.
//!
//! # Data Flow
//! ```text
//! ClientOptions (conn, timeout, default headers, middlewares)
//!     → Client (User-Agent injected, transport timeout-scoped)
//!     → new_stream_request / new_request / new_json_request
//!     → builder chain → prepare/send through the Transport
//! ```
//!
//! # Design Decisions
//! - Default headers are cloned into every builder, never shared
//! - Per-client timeouts wrap the transport instead of mutating the pool
//! - Client configuration mutators take `&mut self`; request execution only
//!   needs `&self`

pub mod agent;
pub mod conn;
pub mod context;
pub mod error;
pub mod headers;
pub mod request;
pub mod transport;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{Method, Request, StatusCode, Url};
use serde::{Serialize, Serializer};

pub use agent::{combine_url, user_agent, AgentEnv};
pub use conn::{Conn, ConnOptions, DialerHookEvent};
pub use context::Context;
pub use error::{BoxError, ClientError, ClientResult};
pub use headers::HeaderBag;
pub use request::{JsonRequester, RequestOption, Requester, StreamRequester};
pub use transport::Transport;

/// Default request timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request mutation run by `prepare`, in registration order.
pub type RequestMiddleware =
    Arc<dyn Fn(&Context, Request) -> Result<Request, BoxError> + Send + Sync>;

/// Options for [`Client::with_options`].
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// Transport to use; a pooled [`Conn`] is built when absent.
    pub conn: Option<Arc<dyn Transport>>,
    /// Default timeout for every request. Zero selects [`DEFAULT_TIMEOUT`].
    pub max_request_timeout: Duration,
    pub headers: HeaderBag,
    pub middlewares: Vec<RequestMiddleware>,
    /// Environment the User-Agent is derived from; the process
    /// environment when absent.
    pub agent_env: Option<AgentEnv>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("conn", &self.conn.is_some())
            .field("max_request_timeout", &self.max_request_timeout)
            .field("headers", &self.headers)
            .field("middlewares", &self.middlewares.len())
            .field("agent_env", &self.agent_env)
            .finish()
    }
}

impl ClientOptions {
    /// Append every pair to the default headers.
    pub fn add_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.headers.add(k, v);
        }
        self
    }

    pub fn with_conn(mut self, conn: Arc<dyn Transport>) -> Self {
        self.conn = Some(conn);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.max_request_timeout = timeout;
        self
    }

    pub fn with_middleware(mut self, middleware: RequestMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn with_middlewares(mut self, middlewares: Vec<RequestMiddleware>) -> Self {
        self.middlewares.extend(middlewares);
        self
    }

    pub fn with_agent_env(mut self, env: AgentEnv) -> Self {
        self.agent_env = Some(env);
        self
    }
}

/// What every builder of a client shares.
#[derive(Clone)]
pub(crate) struct Target {
    pub(crate) host: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) middlewares: Arc<[RequestMiddleware]>,
}

/// HTTP client bound to one base host.
#[derive(Clone)]
pub struct Client {
    target: Arc<Target>,
    base: Arc<dyn Transport>,
    default_timeout: Duration,
    headers: HeaderBag,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.target.host)
            .field("default_timeout", &self.default_timeout)
            .field("headers", &self.headers)
            .field("middlewares", &self.target.middlewares.len())
            .finish()
    }
}

impl Client {
    /// Client for `host` with default options.
    pub fn new(host: impl Into<String>) -> ClientResult<Self> {
        Self::with_options(host, ClientOptions::default())
    }

    /// Client for `host` with a custom transport, timeout, headers or
    /// middlewares.
    pub fn with_options(host: impl Into<String>, options: ClientOptions) -> ClientResult<Self> {
        let mut options = options;
        if options.max_request_timeout.is_zero() {
            options.max_request_timeout = DEFAULT_TIMEOUT;
        }
        let base: Arc<dyn Transport> = match options.conn.take() {
            Some(conn) => conn,
            None => Arc::new(Conn::new(
                ConnOptions::default()
                    .with_request_timeout(options.max_request_timeout)
                    .with_timeout(options.max_request_timeout),
            )?),
        };

        let env = options.agent_env.unwrap_or_else(AgentEnv::from_process);
        let mut headers = options.headers;
        headers.add("User-Agent", user_agent(&env));

        let default_timeout = options.max_request_timeout;
        let target = Target {
            host: host.into(),
            transport: scope(&base, default_timeout),
            middlewares: options.middlewares.into(),
        };

        tracing::debug!(
            host = %target.host,
            timeout = ?default_timeout,
            middlewares = target.middlewares.len(),
            "Client created"
        );

        Ok(Self {
            target: Arc::new(target),
            base,
            default_timeout,
            headers,
        })
    }

    pub fn host(&self) -> &str {
        &self.target.host
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn default_headers(&self) -> &HeaderBag {
        &self.headers
    }

    /// Timeout enforced by the transport of this client.
    pub fn transport_timeout(&self) -> Option<Duration> {
        self.target.transport.timeout()
    }

    pub fn full_url(&self, endpoint: &str) -> String {
        combine_url(&self.target.host, endpoint)
    }

    /// Append a default header for all requests created from now on.
    ///
    /// Use [`Self::set_default_header`] to keep a single value.
    pub fn add_default_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.add(key, value);
        self
    }

    /// Replace any default header with the same name.
    pub fn set_default_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.set(key, value);
        self
    }

    /// Change the default timeout for requests created from now on.
    ///
    /// A zero timeout leaves the current transport bound in place.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.default_timeout = timeout;
        if timeout.is_zero() {
            return self;
        }
        let target = Target {
            transport: scope(&self.base, timeout),
            ..(*self.target).clone()
        };
        self.target = Arc::new(target);
        self
    }

    pub fn new_stream_request(
        &self,
        opts: impl IntoIterator<Item = RequestOption>,
    ) -> StreamRequester {
        let mut req = StreamRequester::new(self.target.clone(), self.headers.clone());
        for opt in opts {
            opt.apply(&mut req);
        }
        req
    }

    pub fn new_request(&self, opts: impl IntoIterator<Item = RequestOption>) -> Requester {
        Requester::new(self.new_stream_request(opts))
    }

    pub fn new_json_request(&self, opts: impl IntoIterator<Item = RequestOption>) -> JsonRequester {
        JsonRequester::new(self.new_request(opts))
    }

    /// Send `body` and buffer the response.
    pub async fn request<M>(
        &self,
        ctx: &Context,
        method: M,
        endpoint: &str,
        body: impl Into<Bytes>,
    ) -> ClientResult<(StatusCode, Bytes)>
    where
        M: TryInto<Method>,
        M::Error: Into<BoxError>,
    {
        self.new_request([]).send(ctx, method, endpoint, body).await
    }

    /// Send `data` encoded as JSON and buffer the response.
    pub async fn json_request<M, T>(
        &self,
        ctx: &Context,
        method: M,
        endpoint: &str,
        data: &T,
    ) -> ClientResult<(StatusCode, Bytes)>
    where
        M: TryInto<Method>,
        M::Error: Into<BoxError>,
        T: Serialize + ?Sized,
    {
        self.new_json_request([]).send(ctx, method, endpoint, data).await
    }

    /// Reach the host and resolve its addresses.
    pub async fn ping(&self) -> ClientStatusReport {
        let start = Instant::now();
        let sent = self
            .new_stream_request([])
            .send(&Context::background(), Method::GET, "", Bytes::new())
            .await;
        let mut report = ClientStatusReport {
            addresses: Vec::new(),
            error: None,
            ping_duration: start.elapsed(),
        };
        if let Err(err) = sent {
            report.error = Some(err.to_string());
        }

        let url = match Url::parse(&self.target.host) {
            Ok(url) => url,
            Err(err) => {
                report.error = Some(err.to_string());
                return report;
            }
        };
        let host = url.host_str().unwrap_or_default();
        let port = url.port_or_known_default().unwrap_or(80);
        match tokio::net::lookup_host((host, port)).await {
            Ok(addrs) => report.addresses = addrs.map(|addr| addr.ip()).collect(),
            Err(err) => report.error = Some(err.to_string()),
        }

        report
    }
}

fn scope(base: &Arc<dyn Transport>, timeout: Duration) -> Arc<dyn Transport> {
    if !timeout.is_zero() && base.timeout() != Some(timeout) {
        transport::scoped(base.clone(), timeout)
    } else {
        base.clone()
    }
}

/// Connectivity report produced by [`Client::ping`].
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatusReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "elapsed_ns", serialize_with = "as_nanos")]
    pub ping_duration: Duration,
}

fn as_nanos<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}
