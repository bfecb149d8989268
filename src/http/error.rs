//! Typed HTTP error returned by handlers.
//!
//! # Design Decisions
//! - Wire shape is always `{"code": <int>, "message": <string>}`
//! - Codes outside 400..=599 are answered as 500
//! - The rendered message travels in the response extensions so the
//!   access log can report it

use std::fmt;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::client::BoxError;

/// Error carrying the HTTP status a handler wants to answer with.
#[derive(Debug)]
pub struct HttpError {
    code: u16,
    internal: BoxError,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    message: &'a str,
}

/// Message of an error response, kept for logging.
#[derive(Debug, Clone)]
pub struct ErrorMessage(pub String);

impl HttpError {
    pub fn new(code: u16, err: impl Into<BoxError>) -> Self {
        Self {
            code,
            internal: err.into(),
        }
    }

    pub fn msg(code: u16, message: impl Into<String>) -> Self {
        Self::new(code, message.into())
    }

    pub fn not_found() -> Self {
        Self::msg(404, "Not Found")
    }

    pub fn method_not_allowed() -> Self {
        Self::msg(405, "Method Not Allowed")
    }

    pub fn internal() -> Self {
        Self::msg(500, "Internal Server Error")
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> String {
        self.internal.to_string()
    }

    /// Status the error is answered with.
    pub fn status(&self) -> StatusCode {
        if (400..600).contains(&self.code) {
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// JSON body: `{"code":..,"message":..}`.
    pub fn json(&self) -> String {
        let message = self.message();
        let body = ErrorBody {
            code: self.code,
            message: &message,
        };
        // a struct of an integer and a string cannot fail to serialize
        serde_json::to_string(&body).unwrap_or_default()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code={}, message={}", self.code, self.internal)?;
        if let Some(source) = self.internal.source() {
            write!(f, ", internal={}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.internal.source()
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status(),
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            self.json(),
        )
            .into_response();
        response
            .extensions_mut()
            .insert(ErrorMessage(self.message()));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[derive(Debug)]
    struct Wrapped(std::io::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("lookup failed")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn display_without_source() {
        let err = HttpError::msg(404, "poopi");
        assert_eq!(err.to_string(), "code=404, message=poopi");
    }

    #[test]
    fn display_with_source() {
        let err = HttpError::new(502, Wrapped(std::io::Error::other("timeout")));
        assert_eq!(
            err.to_string(),
            "code=502, message=lookup failed, internal=timeout"
        );
    }

    #[test]
    fn json_shape_escapes_message() {
        let err = HttpError::msg(400, r#"bad "input""#);
        assert_eq!(err.json(), r#"{"code":400,"message":"bad \"input\""}"#);
    }

    #[test]
    fn status_is_clamped_to_error_range() {
        assert_eq!(HttpError::msg(404, "x").status(), StatusCode::NOT_FOUND);
        assert_eq!(HttpError::msg(599, "x").status().as_u16(), 599);
        assert_eq!(HttpError::msg(200, "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(HttpError::msg(302, "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(HttpError::msg(600, "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn response_carries_json_body() {
        let response = HttpError::msg(200, "odd").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(
            response.extensions().get::<ErrorMessage>().map(|m| m.0.as_str()),
            Some("odd")
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"code":200,"message":"odd"}"#);
    }
}
