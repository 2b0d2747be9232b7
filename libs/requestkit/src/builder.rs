use crate::config::{
    ConnectionLostRetry, LogLevel, NetworkConfig, QueueConfig, RetryConfig, TlsRootConfig,
    TransportSecurity,
};
use crate::error::HttpError;
use crate::interceptor::{
    Authentication, AuthenticationAdapter, BackoffRetryPolicy, ConnectionLostRetryPolicy,
    Interceptor, InterceptorLayer, ParamKeyAdapter, RequestAdapter, RetryPolicy,
};
use crate::layers::DefaultHeadersLayer;
use crate::monitor::{EventMonitor, NetworkLogger};
use crate::network::{ErrorReporter, Network};
use crate::queue::{DownloadExecutor, QueueManager, RequestExecutor, UploadExecutor};
use crate::response::ResponseBody;
use crate::session::{BufferedService, Session, map_tower_error};
use crate::tls::https_connector;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::{Layer, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::FollowRedirectLayer;
use tower_http::follow_redirect::policy::Limited;

/// Builder for a [`Network`]: transport stack, interceptor chain, monitors
/// and the three queue managers.
pub struct NetworkBuilder {
    config: NetworkConfig,
    adapters: Vec<Arc<dyn RequestAdapter>>,
    policies: Vec<Arc<dyn RetryPolicy>>,
    monitors: Vec<Arc<dyn EventMonitor>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl std::fmt::Debug for NetworkBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkBuilder")
            .field("config", &self.config)
            .field("adapters", &self.adapters.len())
            .field("policies", &self.policies.len())
            .field("monitors", &self.monitors.len())
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

impl NetworkBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(NetworkConfig::default())
    }

    #[must_use]
    pub fn with_config(config: NetworkConfig) -> Self {
        Self {
            config,
            adapters: Vec::new(),
            policies: Vec::new(),
            monitors: Vec::new(),
            reporter: None,
        }
    }

    /// Per-attempt timeout; each retry gets its own.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Deadline spanning all attempts and backoff delays.
    ///
    /// Exceeding it fails the call with `HttpError::DeadlineExceeded`.
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Header sent with every request that does not set it itself.
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Exponential backoff retries, consulted after custom policies.
    #[must_use]
    pub fn retry(mut self, retry: Option<RetryConfig>) -> Self {
        self.config.retry = retry;
        self
    }

    /// Connection-lost safety net, always consulted last. `None` removes it.
    #[must_use]
    pub fn connection_lost_retry(mut self, retry: Option<ConnectionLostRetry>) -> Self {
        self.config.connection_lost_retry = retry;
        self
    }

    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow plain HTTP (local mock servers only).
    ///
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "requestkit::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Set to `0` to hand 3xx responses back unfollowed.
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Built-in logger verbosity; `None` disables the logger.
    #[must_use]
    pub fn log_level(mut self, level: Option<LogLevel>) -> Self {
        self.config.log_level = level;
        self
    }

    #[must_use]
    pub fn request_queue(mut self, queue: QueueConfig) -> Self {
        self.config.request_queue = queue;
        self
    }

    #[must_use]
    pub fn download_queue(mut self, queue: QueueConfig) -> Self {
        self.config.download_queue = queue;
        self
    }

    #[must_use]
    pub fn upload_queue(mut self, queue: QueueConfig) -> Self {
        self.config.upload_queue = queue;
        self
    }

    /// Adapters run before every attempt, in registration order.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn RequestAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Shorthand for an [`AuthenticationAdapter`].
    #[must_use]
    pub fn authentication(self, authentication: Authentication) -> Self {
        self.adapter(Arc::new(AuthenticationAdapter::new(authentication)))
    }

    /// Shorthand for a [`ParamKeyAdapter`] appending `name=value` to every query.
    #[must_use]
    pub fn param_key(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.adapter(Arc::new(ParamKeyAdapter::new(name, value)))
    }

    /// Custom policies are consulted in registration order, before the
    /// configured backoff and connection-lost policies.
    #[must_use]
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    #[must_use]
    pub fn event_monitor(mut self, monitor: Arc<dyn EventMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }

    #[must_use]
    pub fn error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Replace the whole configuration; later setters refine it.
    #[must_use]
    pub fn config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the network and its three queue managers on the current runtime.
    ///
    /// # Errors
    /// Returns `HttpError::RuntimeUnavailable` outside a Tokio runtime,
    /// `HttpError::Tls` when TLS cannot be initialized, and
    /// `HttpError::InvalidHeaderName`/`InvalidHeaderValue` for a malformed
    /// user agent or default header.
    pub fn build(self) -> Result<Network, HttpError> {
        let runtime = Handle::try_current().map_err(|_| HttpError::RuntimeUnavailable)?;

        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let service = self.transport_service()?;

        let mut monitors: Vec<Arc<dyn EventMonitor>> = Vec::with_capacity(self.monitors.len() + 1);
        if let Some(level) = self.config.log_level {
            monitors.push(Arc::new(NetworkLogger::new(level)));
        }
        monitors.extend(self.monitors);

        let session = Session::new(
            service,
            self.config.max_body_size,
            self.config.transport,
            monitors,
        );

        let request_manager = QueueManager::new(
            RequestExecutor::new(session.clone()),
            self.config.request_queue,
            runtime.clone(),
        );
        let download_manager = QueueManager::new(
            DownloadExecutor::new(session.clone()),
            self.config.download_queue,
            runtime.clone(),
        );
        let upload_manager = QueueManager::new(
            UploadExecutor::new(session.clone()),
            self.config.upload_queue,
            runtime,
        );

        Ok(Network::from_parts(
            session,
            request_manager,
            download_manager,
            upload_manager,
            self.reporter,
        ))
    }

    fn interceptor(&self) -> Interceptor {
        let mut interceptor = Interceptor::new();
        for adapter in &self.adapters {
            interceptor.push_adapter(Arc::clone(adapter));
        }
        for policy in &self.policies {
            interceptor.push_policy(Arc::clone(policy));
        }
        if let Some(retry) = &self.config.retry {
            interceptor.push_policy(Arc::new(BackoffRetryPolicy::new(retry.clone())));
        }
        if let Some(settings) = self.config.connection_lost_retry {
            interceptor.push_policy(Arc::new(ConnectionLostRetryPolicy::new(settings)));
        }
        interceptor
    }

    // Request flow (outer to inner):
    //   Buffer -> Interceptor (adapters + retry policies) -> ErrorMapping ->
    //   Timeout -> DefaultHeaders -> Decompression -> FollowRedirect -> hyper
    //
    // The interceptor sits outside the timeout so every attempt gets its own
    // timeout and every retry re-runs the adapters.
    fn transport_service(&self) -> Result<BufferedService, HttpError> {
        let timeout = self.config.request_timeout;
        let https = https_connector(self.config.tls_roots, self.config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = self.config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let headers_layer =
            DefaultHeadersLayer::try_new(&self.config.user_agent, &self.config.default_headers)?;

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(headers_layer)
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::with_policy(Limited::new(
                self.config.max_redirects,
            )))
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout))
            .boxed_clone();

        let intercepted =
            InterceptorLayer::new(self.interceptor(), self.config.total_timeout).layer(service);

        Ok(Buffer::new(intercepted, self.config.buffer_capacity.max(1)))
    }
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Box the (possibly decompressed) response body into [`ResponseBody`].
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed)
}
