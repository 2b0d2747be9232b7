use crate::response::ResponseSnapshot;
use crate::task::{Destination, TaskKind};
use std::time::Duration;
use thiserror::Error;

/// Boxed error type used for type-erased transport and adapter failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures produced while a wire request travels through the transport.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Invalid header name in configuration
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value in configuration
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Single request attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Total operation deadline exceeded (including all retries)
    #[error("Operation deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Response status rejected by the descriptor's validation policy
    #[error("Response status {status} rejected by validation")]
    Validation { status: http::StatusCode },

    /// A request adapter refused to prepare the request
    #[error("Request adapter failed: {0}")]
    Adapter(#[source] BoxError),

    /// File system failure while writing a download or reading an upload part
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation was cancelled before it produced a result
    #[error("Operation cancelled")]
    Cancelled,

    /// Buffer worker died or channel closed unexpectedly
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// Construction was attempted outside a Tokio runtime
    #[error("No Tokio runtime available; build the network inside a runtime context")]
    RuntimeUnavailable,

    /// URL scheme not allowed by the transport security setting
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl HttpError {
    /// Whether this failure means the connection dropped mid-flight.
    ///
    /// Walks the source chain of transport errors looking for reset,
    /// aborted, broken-pipe or truncated-message conditions.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        let Self::Transport(err) = self else {
            return false;
        };
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err.as_ref());
        while let Some(err) = current {
            if let Some(io) = err.downcast_ref::<std::io::Error>()
                && matches!(
                    io.kind(),
                    std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::UnexpectedEof
                        | std::io::ErrorKind::NotConnected
                )
            {
                return true;
            }
            if let Some(hyper_err) = err.downcast_ref::<hyper::Error>()
                && (hyper_err.is_incomplete_message() || hyper_err.is_closed())
            {
                return true;
            }
            current = err.source();
        }
        false
    }
}

/// Failures turning a request descriptor into a wire request.
///
/// Raised synchronously by the facade, before any operation is enqueued.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EncodingError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Composite parameters must place their body half in the body
    #[error(
        "composite body parameters must be URL-encoded into the HTTP body, got destination {destination:?}; move them to the URL parameters instead"
    )]
    DisallowedBodyEncoding { destination: Destination },

    /// The descriptor's task does not fit the entry point it was handed to
    #[error("`{operation}` cannot run a {kind} task")]
    TaskKindMismatch {
        operation: &'static str,
        kind: TaskKind,
    },
}

/// Failures extracting a typed value from a response payload.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("JSON decoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("key path '{key}' not found in response")]
    MissingKey { key: String },

    #[error("response is not a JSON object; cannot look up key path '{key}'")]
    NotAnObject { key: String },
}

/// Error delivered to facade completions.
///
/// Carries the response snapshot (status, headers, body) whenever the
/// server produced a response.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The transport failed, validation rejected the response or the operation was cancelled
    #[error("{source}")]
    Underlying {
        #[source]
        source: HttpError,
        response: Option<ResponseSnapshot>,
    },

    /// The payload arrived but could not be decoded into the expected type
    #[error("Object mapping failed: {source}")]
    ObjectMapping {
        #[source]
        source: DecodeError,
        response: Option<ResponseSnapshot>,
    },
}

impl NetworkError {
    /// Response snapshot, when the server answered.
    #[must_use]
    pub fn response(&self) -> Option<&ResponseSnapshot> {
        match self {
            Self::Underlying { response, .. } | Self::ObjectMapping { response, .. } => {
                response.as_ref()
            }
        }
    }

    /// HTTP status of the response, when the server answered.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        self.response().map(ResponseSnapshot::status)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Underlying {
                source: HttpError::Cancelled,
                ..
            }
        )
    }

    #[must_use]
    pub fn underlying(source: HttpError, response: Option<ResponseSnapshot>) -> Self {
        Self::Underlying { source, response }
    }
}
