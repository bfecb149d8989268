//! Immutable request builders.
//!
//! # Data Flow
//! ```text
//! Client::new_*_request (default headers cloned)
//!     → with_* chain (every call returns a fresh clone)
//!     → prepare (URL join, headers, context deadline, middlewares)
//!     → send (transport) → status + body
//! ```
//!
//! # Design Decisions
//! - `StreamRequester` → `Requester` → `JsonRequester` compose by value
//! - Builders never change after creation, so one value can be sent any
//!   number of times and shared across tasks

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Method, Request, Response, StatusCode, Url};
use serde::Serialize;

use crate::client::agent::combine_url;
use crate::client::context::Context;
use crate::client::error::{BoxError, ClientError, ClientResult};
use crate::client::headers::HeaderBag;
use crate::client::Target;

/// Mutation applied to a builder while a `Client` creates it.
pub struct RequestOption(Box<dyn FnOnce(&mut StreamRequester) + Send>);

impl RequestOption {
    /// Wrap an arbitrary builder mutation.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut StreamRequester) + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Set the initial request timeout.
    pub fn timeout(timeout: Duration) -> Self {
        Self::new(move |req| req.timeout = non_zero(timeout))
    }

    /// Set unique headers, overriding client defaults with the same name.
    pub fn headers<K, V>(headers: HashMap<K, V>) -> Self
    where
        K: Into<String> + Send + 'static,
        V: Into<String> + Send + 'static,
    {
        Self::new(move |req| {
            for (k, v) in headers {
                req.headers.set(k, v);
            }
        })
    }

    /// Append a header value.
    pub fn header(key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        Self::new(move |req| req.headers.add(key, value))
    }

    /// Replace every value of a header.
    pub fn unique_header(key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        Self::new(move |req| req.headers.set(key, value))
    }

    /// Set a header only if it has no value yet.
    pub fn default_header(key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        Self::new(move |req| {
            if req.headers.get(&key).is_some_and(|v| !v.is_empty()) {
                return;
            }
            req.headers.set(key, value);
        })
    }

    pub(crate) fn apply(self, req: &mut StreamRequester) {
        (self.0)(req)
    }
}

impl fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestOption")
    }
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

/// Request builder returning the response body as a stream.
#[derive(Clone, Default)]
pub struct StreamRequester {
    target: Option<Arc<Target>>,
    headers: HeaderBag,
    timeout: Option<Duration>,
}

impl fmt::Debug for StreamRequester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRequester")
            .field("host", &self.target.as_ref().map(|t| t.host.as_str()))
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StreamRequester {
    pub(crate) fn new(target: Arc<Target>, headers: HeaderBag) -> Self {
        Self {
            target: Some(target),
            headers,
            timeout: None,
        }
    }

    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn with_header(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut req = self.clone();
        req.headers.add(key, value);
        req
    }

    pub fn with_unique_header(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut req = self.clone();
        req.headers.set(key, value);
        req
    }

    /// Set every header in `headers`, replacing existing values.
    pub fn with_headers<I, K, V>(&self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut req = self.clone();
        for (k, v) in headers {
            req.headers.set(k, v);
        }
        req
    }

    /// Per-request timeout. Zero removes it.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut req = self.clone();
        req.timeout = non_zero(timeout);
        req
    }

    /// Derive a context bounded by this builder's timeout.
    pub fn context(&self, parent: Context) -> Context {
        match self.timeout {
            Some(timeout) => parent.with_timeout(timeout),
            None => parent,
        }
    }

    /// Build the `reqwest::Request` without sending it.
    ///
    /// The deadline of `ctx` becomes the request timeout. Middlewares run
    /// in registration order.
    pub fn prepare<M>(
        &self,
        ctx: &Context,
        method: M,
        endpoint: &str,
        body: impl Into<Body>,
    ) -> ClientResult<Request>
    where
        M: TryInto<Method>,
        M::Error: Into<BoxError>,
    {
        let target = self.target.as_ref().ok_or(ClientError::InvalidBuilder)?;

        let method = method
            .try_into()
            .map_err(|e| ClientError::Construction(e.into()))?;
        let url = Url::parse(&combine_url(&target.host, endpoint))
            .map_err(|e| ClientError::Construction(e.into()))?;
        let headers = self
            .headers
            .to_header_map()
            .map_err(ClientError::Construction)?;

        let mut request = Request::new(method, url);
        *request.headers_mut() = headers;
        *request.body_mut() = Some(body.into());
        *request.timeout_mut() = ctx.remaining();

        for (index, middleware) in target.middlewares.iter().enumerate() {
            request = middleware(ctx, request)
                .map_err(|source| ClientError::Middleware { index, source })?;
        }

        Ok(request)
    }

    /// Send the request and hand the response body to the caller.
    ///
    /// Only the deadline of `ctx` applies; derive it with [`Self::context`]
    /// to include the builder timeout.
    pub async fn send<M>(
        &self,
        ctx: &Context,
        method: M,
        endpoint: &str,
        body: impl Into<Body>,
    ) -> ClientResult<(StatusCode, Response)>
    where
        M: TryInto<Method>,
        M::Error: Into<BoxError>,
    {
        let request = self.prepare(ctx, method, endpoint, body)?;
        let Some(target) = self.target.as_ref() else {
            return Err(ClientError::InvalidBuilder);
        };

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            timeout = ?request.timeout(),
            "Sending request"
        );

        let response = target
            .transport
            .execute(request)
            .await
            .map_err(ClientError::Transport)?;
        Ok((response.status(), response))
    }
}

/// Request builder buffering the whole response body.
#[derive(Debug, Clone, Default)]
pub struct Requester {
    core: StreamRequester,
}

impl Requester {
    pub(crate) fn new(core: StreamRequester) -> Self {
        Self { core }
    }

    pub fn headers(&self) -> &HeaderBag {
        self.core.headers()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.core.timeout()
    }

    pub fn with_header(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(self.core.with_header(key, value))
    }

    pub fn with_unique_header(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(self.core.with_unique_header(key, value))
    }

    pub fn with_headers<I, K, V>(&self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(self.core.with_headers(headers))
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self::new(self.core.with_timeout(timeout))
    }

    /// Build the request. `ctx` is used as given, without the builder
    /// timeout.
    pub fn prepare<M>(
        &self,
        ctx: &Context,
        method: M,
        endpoint: &str,
        body: impl Into<Bytes>,
    ) -> ClientResult<Request>
    where
        M: TryInto<Method>,
        M::Error: Into<BoxError>,
    {
        let body: Bytes = body.into();
        self.core.prepare(ctx, method, endpoint, body)
    }

    /// Send the request and read the full response body.
    ///
    /// The builder timeout bounds the whole exchange, body included. A body
    /// read failure still reports the status code through
    /// [`ClientError::status`].
    pub async fn send<M>(
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
        let ctx = self.core.context(*ctx);
        let body: Bytes = body.into();
        let (status, response) = self.core.send(&ctx, method, endpoint, body).await?;

        let payload = response
            .bytes()
            .await
            .map_err(|source| ClientError::BodyRead { status, source })?;
        Ok((status, payload))
    }
}

/// Request builder encoding payloads as JSON.
#[derive(Debug, Clone)]
pub struct JsonRequester {
    core: Requester,
}

impl JsonRequester {
    pub(crate) fn new(core: Requester) -> Self {
        let mut core = core;
        core.core.headers.set(CONTENT_TYPE.as_str(), "application/json");
        Self { core }
    }

    pub fn headers(&self) -> &HeaderBag {
        self.core.headers()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.core.timeout()
    }

    pub fn with_header(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            core: self.core.with_header(key, value),
        }
    }

    pub fn with_unique_header(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            core: self.core.with_unique_header(key, value),
        }
    }

    pub fn with_headers<I, K, V>(&self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            core: self.core.with_headers(headers),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            core: self.core.with_timeout(timeout),
        }
    }

    pub fn prepare<M, T>(
        &self,
        ctx: &Context,
        method: M,
        endpoint: &str,
        data: &T,
    ) -> ClientResult<Request>
    where
        M: TryInto<Method>,
        M::Error: Into<BoxError>,
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(data)?;
        self.core.prepare(ctx, method, endpoint, body)
    }

    pub async fn send<M, T>(
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
        let body = serde_json::to_vec(data)?;
        self.core.send(ctx, method, endpoint, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::mock::{MockTransport, Reply};
    use crate::client::{Client, ClientOptions, RequestMiddleware};
    use std::collections::BTreeMap;

    fn client(reply: Reply) -> (Client, MockTransport) {
        client_with(reply, Vec::new())
    }

    fn client_with(reply: Reply, middlewares: Vec<RequestMiddleware>) -> (Client, MockTransport) {
        let mock = MockTransport::new(reply);
        let options = ClientOptions::default()
            .with_conn(Arc::new(mock.clone()))
            .add_headers([("dh", "z")])
            .with_middlewares(middlewares);
        let client = Client::with_options("http://127.0.0.1:8080", options).unwrap();
        (client, mock)
    }

    fn middleware<F>(f: F) -> RequestMiddleware
    where
        F: Fn(&Context, Request) -> Result<Request, BoxError> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    fn values(request: &Request, name: &str) -> Vec<String> {
        request
            .headers()
            .get_all(name)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn with_methods_leave_receiver_untouched() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let base = cli.new_stream_request([]);
        let before = base.headers().clone();

        let _ = base.with_header("h1", "v1");
        let _ = base.with_unique_header("dh", "other");
        let _ = base.with_headers([("h2", "v2")]);
        let _ = base.with_timeout(Duration::from_secs(1));

        assert_eq!(base.headers(), &before);
        assert_eq!(base.timeout(), None);
    }

    #[test]
    fn sibling_builders_are_independent() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let parent = cli.new_request([]).with_header("shared", "p");

        let left = parent.with_header("shared", "l");
        let right = parent.with_header("shared", "r").with_header("only-right", "x");
        let left = left.with_header("only-left", "y");

        assert_eq!(parent.headers().values("shared"), ["p"]);
        assert_eq!(left.headers().values("shared"), ["p", "l"]);
        assert_eq!(right.headers().values("shared"), ["p", "r"]);
        assert!(!left.headers().contains("only-right"));
        assert!(!right.headers().contains("only-left"));
    }

    #[test]
    fn header_accumulates_and_unique_header_replaces() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let req = cli
            .new_request([])
            .with_header("h1", "v1")
            .with_header("h1", "v2")
            .with_unique_header("h2", "v1")
            .with_unique_header("h2", "v2");

        assert_eq!(req.headers().values("h1"), ["v1", "v2"]);
        assert_eq!(req.headers().values("h2"), ["v2"]);
    }

    #[test]
    fn with_headers_replaces_per_key() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let map: BTreeMap<_, _> = [("dh", "y"), ("h1", "v1")].into_iter().collect();
        let req = cli.new_request([]).with_header("h1", "old").with_headers(map);

        assert_eq!(req.headers().values("dh"), ["y"]);
        assert_eq!(req.headers().values("h1"), ["v1"]);
    }

    #[test]
    fn zero_timeout_means_unset() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let req = cli.new_request([]).with_timeout(Duration::from_secs(3));
        assert_eq!(req.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(req.with_timeout(Duration::ZERO).timeout(), None);
    }

    #[test]
    fn options_apply_in_order() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let req = cli.new_request([
            RequestOption::timeout(Duration::from_secs(5)),
            RequestOption::header("h1", "v1"),
            RequestOption::header("h1", "v2"),
            RequestOption::unique_header("h2", "v1"),
            RequestOption::unique_header("h2", "v2"),
            RequestOption::default_header("dh", "ignored"),
            RequestOption::default_header("h3", "v3"),
        ]);
        let prepared = req
            .prepare(&Context::background(), "GET", "/", Bytes::new())
            .unwrap();

        assert_eq!(req.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(values(&prepared, "h1"), ["v1", "v2"]);
        assert_eq!(values(&prepared, "h2"), ["v2"]);
        assert_eq!(values(&prepared, "dh"), ["z"]);
        assert_eq!(values(&prepared, "h3"), ["v3"]);
        assert!(!values(&prepared, "user-agent").is_empty());
        assert_eq!(prepared.headers().keys_len(), 5);
    }

    #[test]
    fn prepare_builds_url_and_headers() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let prepared = cli
            .new_request([])
            .with_header("h1", "v1")
            .prepare(&Context::background(), Method::POST, "/items", "payload")
            .unwrap();

        assert_eq!(prepared.method(), Method::POST);
        assert_eq!(prepared.url().as_str(), "http://127.0.0.1:8080/items");
        assert_eq!(values(&prepared, "h1"), ["v1"]);
        assert_eq!(prepared.body().and_then(|b| b.as_bytes()), Some(&b"payload"[..]));
        assert_eq!(prepared.timeout(), None);
    }

    #[test]
    fn prepare_copies_context_deadline() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let req = cli.new_request([]).with_timeout(Duration::from_secs(60));
        let ctx = Context::background().with_timeout(Duration::from_secs(2));
        let prepared = req.prepare(&ctx, "GET", "/", Bytes::new()).unwrap();

        let timeout = *prepared.timeout().unwrap();
        assert!(timeout <= Duration::from_secs(2));
    }

    #[test]
    fn zero_value_builder_is_invalid() {
        let err = StreamRequester::default()
            .prepare(&Context::background(), "GET", "/", Body::from(""))
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidBuilder));

        let err = Requester::default()
            .prepare(&Context::background(), "GET", "/", Bytes::new())
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidBuilder));
    }

    #[test]
    fn malformed_method_url_or_header_fails_construction() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let req = cli.new_request([]);
        let ctx = Context::background();

        let err = req.prepare(&ctx, "BAD METHOD", "/", Bytes::new()).unwrap_err();
        assert!(matches!(err, ClientError::Construction(_)));

        let err = req
            .with_header("bad header", "v")
            .prepare(&ctx, "GET", "/", Bytes::new())
            .unwrap_err();
        assert!(matches!(err, ClientError::Construction(_)));

        let bad_host = Client::with_options(
            "not a url",
            ClientOptions::default().with_conn(Arc::new(MockTransport::new(Reply::Fail))),
        )
        .unwrap();
        let err = bad_host
            .new_request([])
            .prepare(&ctx, "GET", "/", Bytes::new())
            .unwrap_err();
        assert!(matches!(err, ClientError::Construction(_)));
    }

    #[test]
    fn middlewares_run_in_registration_order() {
        let first = middleware(|_ctx, mut req| {
            req.headers_mut().append("mh", "first".parse().unwrap());
            Ok(req)
        });
        let second = middleware(|_ctx, mut req| {
            req.headers_mut().append("mh", "second".parse().unwrap());
            Ok(req)
        });
        let (cli, _) = client_with(Reply::Ok(200, "ok"), vec![first, second]);

        let prepared = cli
            .new_request([])
            .prepare(&Context::background(), "GET", "/", Bytes::new())
            .unwrap();
        assert_eq!(values(&prepared, "mh"), ["first", "second"]);
    }

    #[tokio::test]
    async fn middleware_error_aborts_with_index() {
        let pass = middleware(|_ctx, req| Ok(req));
        let fail = middleware(|_ctx, _req| Err("puff".into()));
        let (cli, mock) = client_with(Reply::Ok(200, "ok"), vec![pass, fail]);

        let err = cli
            .request(&Context::background(), "GET", "/t02", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Middleware { index: 1, .. }));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_returns_no_status() {
        let (cli, _) = client(Reply::Fail);
        let err = cli
            .new_request([])
            .send(&Context::background(), "GET", "/", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn body_read_failure_keeps_status() {
        let (cli, _) = client(Reply::TruncatedBody(200));
        let err = cli
            .new_request([])
            .send(&Context::background(), "GET", "/", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::BodyRead { .. }));
        assert_eq!(err.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn buffered_send_returns_status_and_body() {
        let (cli, mock) = client(Reply::Ok(201, "created"));
        let (status, body) = cli
            .new_request([])
            .send(&Context::background(), "PUT", "/things/1", "data")
            .await
            .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, Bytes::from_static(b"created"));
        let calls = mock.calls();
        assert_eq!(calls[0].method, "PUT");
        assert_eq!(calls[0].url, "http://127.0.0.1:8080/things/1");
        assert_eq!(calls[0].body.as_deref(), Some(&b"data"[..]));
    }

    #[tokio::test]
    async fn replayed_builder_sends_identical_headers() {
        let (cli, mock) = client(Reply::Ok(200, "ok"));
        let req = cli.new_request([]).with_header("h1", "v1");
        let ctx = Context::background();

        req.send(&ctx, "GET", "/", Bytes::new()).await.unwrap();
        req.send(&ctx, "GET", "/", Bytes::new()).await.unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].headers, calls[1].headers);
        assert_eq!(req.headers().values("h1"), ["v1"]);
    }

    #[tokio::test]
    async fn buffered_send_applies_builder_timeout() {
        let (cli, mock) = client(Reply::Ok(200, "ok"));
        cli.new_request([])
            .with_timeout(Duration::from_secs(1))
            .send(&Context::background(), "GET", "/", Bytes::new())
            .await
            .unwrap();

        let timeout = mock.calls()[0].timeout.unwrap();
        assert!(timeout <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn stream_send_ignores_builder_timeout() {
        let (cli, mock) = client(Reply::Ok(200, "streamed"));
        let (status, response) = cli
            .new_stream_request([])
            .with_timeout(Duration::from_secs(1))
            .send(&Context::background(), "GET", "/", Body::from(""))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.bytes().await.unwrap(), "streamed");
        // only the client-wide default applies
        assert_eq!(mock.calls()[0].timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn json_builder_has_single_content_type() {
        let (cli, _) = client(Reply::Ok(200, "ok"));
        let req = cli
            .new_json_request([RequestOption::header("h1", "v1")])
            .with_timeout(Duration::from_secs(5))
            .with_header("h1", "v2")
            .with_unique_header("h2", "v1");
        let derived = req.with_header("h3", "x").with_headers([("h4", "y")]);

        for builder in [&req, &derived] {
            let prepared = builder
                .prepare(&Context::background(), "GET", "/", &Option::<()>::None)
                .unwrap();
            assert_eq!(values(&prepared, "content-type"), ["application/json"]);
            assert_eq!(prepared.body().and_then(|b| b.as_bytes()), Some(&b"null"[..]));
        }
        assert!(!req.headers().contains("h3"));
    }

    #[tokio::test]
    async fn json_send_encodes_payload() {
        #[derive(Serialize)]
        struct Item {
            name: &'static str,
        }

        let (cli, mock) = client(Reply::Ok(200, "{}"));
        cli.new_json_request([])
            .send(&Context::background(), "POST", "/items", &Item { name: "demo" })
            .await
            .unwrap();

        assert_eq!(mock.calls()[0].body.as_deref(), Some(&br#"{"name":"demo"}"#[..]));
    }

    #[tokio::test]
    async fn json_encoding_error_skips_network() {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("broken"))
            }
        }

        let (cli, mock) = client(Reply::Ok(200, "ok"));
        let err = cli
            .new_json_request([])
            .send(&Context::background(), "POST", "/", &Broken)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Encoding(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn concurrent_sends_share_one_builder() {
        let (cli, mock) = client(Reply::Ok(200, "ok"));
        let req = cli.new_request([]).with_header("h1", "v1");

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let req = req.clone();
                tokio::spawn(async move {
                    req.with_header("task", i.to_string())
                        .send(&Context::background(), "GET", "/", Bytes::new())
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let calls = mock.calls();
        assert_eq!(calls.len(), 8);
        for call in calls {
            assert_eq!(call.headers.get_all("task").iter().count(), 1);
        }
        assert!(!req.headers().contains("task"));
    }
}
