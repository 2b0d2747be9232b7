#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Declarative HTTP requests executed through bounded-concurrency queues
//!
//! An endpoint is described once as a [`Requestable`]: base URL, path,
//! method, headers, status validation and a [`Task`] saying how the
//! payload is encoded. A [`Network`] turns descriptors into wire requests
//! and runs them on one of three independent [`QueueManager`]s (data,
//! download, upload), each with its own concurrency limit.
//!
//! Every submission returns a [`Cancellable`] and completes exactly once,
//! with either the result or [`NetworkError`] wrapping
//! [`HttpError::Cancelled`].
//!
//! The transport stack is hyper + rustls (HTTPS only by default) with:
//! - request adapters and ordered retry policies around every attempt
//! - per-attempt timeouts and an optional overall deadline
//! - transparent gzip/brotli/deflate decompression
//! - redirect following
//! - pluggable event monitors and a built-in `tracing` logger
//!
//! # Example
//!
//! ```ignore
//! use requestkit::{Network, Requestable, Task};
//! use std::borrow::Cow;
//! use url::Url;
//!
//! struct ListUsers;
//!
//! impl Requestable for ListUsers {
//!     type Response = Vec<User>;
//!
//!     fn base_url(&self) -> Url {
//!         Url::parse("https://api.example.com").unwrap()
//!     }
//!
//!     fn path(&self) -> Cow<'_, str> {
//!         "users".into()
//!     }
//!
//!     fn key_path(&self) -> Option<&str> {
//!         Some("data")
//!     }
//!
//!     fn task(&self) -> Task {
//!         Task::RequestPlain
//!     }
//! }
//!
//! let network = Network::builder().build()?;
//! let users = network.request_stream(&ListUsers)?.await?;
//! ```

mod builder;
mod config;
mod decoder;
mod encoding;
mod error;
pub mod interceptor;
mod layers;
mod monitor;
mod multipart;
mod network;
pub mod queue;
mod requestable;
mod response;
mod session;
mod stream;
mod task;
mod tls;

pub use builder::NetworkBuilder;
pub use config::{
    ConnectionLostRetry, DEFAULT_MAX_CONCURRENCY, DEFAULT_USER_AGENT, ExponentialBackoff,
    IDEMPOTENCY_KEY_HEADER, LogLevel, NetworkConfig, QualityOfService, QueueConfig, RetryConfig,
    RetryTrigger, TlsRootConfig, TransportSecurity, is_idempotent_method,
};
pub use decoder::decode;
pub use encoding::{FORM_CONTENT_TYPE, JSON_CONTENT_TYPE, append_query, query_string};
pub use error::{BoxError, DecodeError, EncodingError, HttpError, NetworkError};
pub use interceptor::{
    Authentication, AuthenticationAdapter, ParamKeyAdapter, RequestAdapter, RetryContext,
    RetryDecision, RetryPolicy,
};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use monitor::{EventMonitor, NetworkLogger, RequestEvent};
pub use multipart::{EncodedForm, MultipartFormData};
pub use network::{DataResult, ErrorReporter, Network, Payload};
pub use queue::{Cancellable, OperationId, OperationState, QueueManager};
pub use requestable::{Requestable, ValidationType, WireRequest, encode_request, join_url};
pub use response::{ResponseBody, ResponseSnapshot};
pub use session::{
    BufferedService, DataResponse, DownloadResponse, Progress, ProgressHandler, RequestSummary,
    ServiceFuture, Session,
};
pub use stream::SingleResponse;
pub use task::{
    ArrayEncoding, BodyEncoder, BoolEncoding, Destination, DownloadDestination, DownloadOptions,
    EncodableBody, JsonBodyEncoder, JsonEncoding, ParameterEncoding, Parameters, Task, TaskKind,
    UrlEncoding,
};
