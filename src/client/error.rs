//! Client error definitions.

use reqwest::StatusCode;
use thiserror::Error;

/// Boxed error used at the transport and middleware seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned while preparing or sending a request.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The builder was not created from a `Client`.
    #[error("request must be created from a Client")]
    InvalidBuilder,

    /// Method, URL or headers could not form a request.
    #[error("error creating request; {0}")]
    Construction(#[source] BoxError),

    /// A registered request middleware rejected the request.
    #[error("failed to run middleware [{index}]; {source}")]
    Middleware {
        index: usize,
        #[source]
        source: BoxError,
    },

    /// Network, DNS, TLS or timeout failure while sending.
    #[error("error running request; {0}")]
    Transport(#[source] BoxError),

    /// The response arrived but its body could not be read.
    #[error("error reading http body; {source}")]
    BodyRead {
        status: StatusCode,
        #[source]
        source: reqwest::Error,
    },

    /// The JSON payload could not be serialized.
    #[error("invalid request body; {0}")]
    Encoding(#[from] serde_json::Error),

    /// The pooled transport could not be built.
    #[error("failed to build connection; {0}")]
    Connection(#[from] reqwest::Error),
}

impl ClientError {
    /// Status code received before the failure, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::BodyRead { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
