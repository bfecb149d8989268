//! Transport seam between request builders and the network.
//!
//! # Responsibilities
//! - Define the narrow "send request, get response" contract
//! - Scope a client-wide timeout without touching the shared pool

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::{Request, Response};

use crate::client::error::BoxError;

/// Sends prepared requests.
///
/// Implementations must be safe for concurrent use; the pool behind them is
/// shared by every builder of a client.
pub trait Transport: Send + Sync + 'static {
    fn execute(&self, request: Request) -> BoxFuture<'static, Result<Response, BoxError>>;

    /// Overall request timeout the transport enforces on its own, if any.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

impl Transport for reqwest::Client {
    fn execute(&self, request: Request) -> BoxFuture<'static, Result<Response, BoxError>> {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await.map_err(Into::into) })
    }
}

/// Wrap `inner` so that every request is bounded by `timeout`.
///
/// A shorter timeout already set on the request is kept.
pub fn scoped(inner: Arc<dyn Transport>, timeout: Duration) -> Arc<dyn Transport> {
    Arc::new(TimeoutScope { inner, timeout })
}

struct TimeoutScope {
    inner: Arc<dyn Transport>,
    timeout: Duration,
}

impl Transport for TimeoutScope {
    fn execute(&self, mut request: Request) -> BoxFuture<'static, Result<Response, BoxError>> {
        let effective = match request.timeout() {
            Some(current) if *current <= self.timeout => *current,
            _ => self.timeout,
        };
        *request.timeout_mut() = Some(effective);
        self.inner.execute(request)
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockTransport, Reply};
    use super::*;

    fn request(timeout: Option<Duration>) -> Request {
        let mut request = Request::new(reqwest::Method::GET, "http://localhost/".parse().unwrap());
        *request.timeout_mut() = timeout;
        request
    }

    #[tokio::test]
    async fn scope_applies_timeout_when_unset() {
        let mock = MockTransport::new(Reply::Ok(200, "ok"));
        let transport = scoped(Arc::new(mock.clone()), Duration::from_secs(5));
        transport.execute(request(None)).await.unwrap();
        assert_eq!(mock.calls()[0].timeout, Some(Duration::from_secs(5)));
        assert_eq!(transport.timeout(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn scope_keeps_shorter_request_timeout() {
        let mock = MockTransport::new(Reply::Ok(200, "ok"));
        let transport = scoped(Arc::new(mock.clone()), Duration::from_secs(5));
        transport
            .execute(request(Some(Duration::from_secs(1))))
            .await
            .unwrap();
        assert_eq!(mock.calls()[0].timeout, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn scope_caps_longer_request_timeout() {
        let mock = MockTransport::new(Reply::Ok(200, "ok"));
        let transport = scoped(Arc::new(mock.clone()), Duration::from_secs(5));
        transport
            .execute(request(Some(Duration::from_secs(30))))
            .await
            .unwrap();
        assert_eq!(mock.calls()[0].timeout, Some(Duration::from_secs(5)));
    }
}
