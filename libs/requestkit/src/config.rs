use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Default User-Agent string for outgoing requests
pub const DEFAULT_USER_AGENT: &str = concat!("requestkit/", env!("CARGO_PKG_VERSION"));

/// Standard idempotency key header name (display form)
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

const IDEMPOTENCY_KEY_HEADER_LOWER: &str = "idempotency-key";

/// Bytes drained from a rejected response before retrying, so the connection can be reused
pub const RETRY_RESPONSE_DRAIN_LIMIT: usize = 64 * 1024;

/// Default number of operations a queue runs at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Conditions that trigger a backoff retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryTrigger {
    /// Transport-level errors (connection refused, DNS failure, reset, etc.)
    TransportError,
    /// Request attempt timeout
    Timeout,
    /// Specific HTTP status code
    Status(u16),
    /// Error that is never retryable (e.g., `DeadlineExceeded`, `ServiceClosed`)
    NonRetryable,
}

impl RetryTrigger {
    pub const TOO_MANY_REQUESTS: Self = Self::Status(429);
    pub const REQUEST_TIMEOUT: Self = Self::Status(408);
    pub const INTERNAL_SERVER_ERROR: Self = Self::Status(500);
    pub const BAD_GATEWAY: Self = Self::Status(502);
    pub const SERVICE_UNAVAILABLE: Self = Self::Status(503);
    pub const GATEWAY_TIMEOUT: Self = Self::Status(504);
}

/// Check if HTTP method is idempotent (safe to retry) per RFC 9110.
#[must_use]
pub fn is_idempotent_method(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::GET
            | http::Method::HEAD
            | http::Method::PUT
            | http::Method::DELETE
            | http::Method::OPTIONS
            | http::Method::TRACE
    )
}

/// Exponential backoff configuration for retries
///
/// Computes delay as: `min(initial * multiplier^attempt, max)` with optional jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    pub initial: Duration,
    /// Maximum backoff duration (default: 10s)
    pub max: Duration,
    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,
    /// Add a random 0-25% delay to each backoff (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// Fast backoff for tests (1ms initial, 100ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

/// Configuration of the backoff retry policy.
///
/// Triggers in `always_retry` retry for every method. Triggers in
/// `idempotent_retry` retry only for idempotent methods, or when the request
/// carries the idempotency key header.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (default: 3)
    pub max_retries: usize,

    pub backoff: ExponentialBackoff,

    /// Default: [Status(429)]
    pub always_retry: HashSet<RetryTrigger>,

    /// Default: `[TransportError, Timeout, Status(408), Status(500), Status(502), Status(503), Status(504)]`
    pub idempotent_retry: HashSet<RetryTrigger>,

    /// Ignore the `Retry-After` header and always use the backoff schedule
    pub ignore_retry_after: bool,

    /// Header that enables `idempotent_retry` triggers for non-idempotent methods
    pub idempotency_key_header: Option<http::header::HeaderName>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            always_retry: HashSet::from([RetryTrigger::TOO_MANY_REQUESTS]),
            idempotent_retry: HashSet::from([
                RetryTrigger::TransportError,
                RetryTrigger::Timeout,
                RetryTrigger::REQUEST_TIMEOUT,
                RetryTrigger::INTERNAL_SERVER_ERROR,
                RetryTrigger::BAD_GATEWAY,
                RetryTrigger::SERVICE_UNAVAILABLE,
                RetryTrigger::GATEWAY_TIMEOUT,
            ]),
            ignore_retry_after: false,
            idempotency_key_header: Some(http::header::HeaderName::from_static(
                IDEMPOTENCY_KEY_HEADER_LOWER,
            )),
        }
    }
}

impl RetryConfig {
    /// Whether `trigger` warrants a retry for a request with this method.
    #[must_use]
    pub fn should_retry(
        &self,
        trigger: RetryTrigger,
        method: &http::Method,
        has_idempotency_key: bool,
    ) -> bool {
        if self.always_retry.contains(&trigger) {
            return true;
        }
        self.idempotent_retry.contains(&trigger)
            && (is_idempotent_method(method) || has_idempotency_key)
    }
}

/// Settings of the connection-lost retry policy that always runs last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLostRetry {
    /// Retries granted per operation (default: 1)
    pub max_retries: usize,
    /// Pause before the retry (default: none)
    pub delay: Duration,
}

impl Default for ConnectionLostRetry {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::ZERO,
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP (local mock servers only)
    AllowInsecureHttp,
}

/// Scheduling hint carried by a queue.
///
/// Tokio has no thread priorities; the hint is recorded on each operation's
/// tracing span so slow background queues can be told apart in logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum QualityOfService {
    Background = 0,
    #[default]
    Utility = 1,
    UserInitiated = 2,
    UserInteractive = 3,
}

impl QualityOfService {
    #[must_use]
    pub const fn from_repr(value: u8) -> Self {
        match value {
            0 => Self::Background,
            2 => Self::UserInitiated,
            3 => Self::UserInteractive,
            _ => Self::Utility,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Utility => "utility",
            Self::UserInitiated => "user_initiated",
            Self::UserInteractive => "user_interactive",
        }
    }
}

/// Settings of one operation queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Operations allowed to run at once (values below 1 are treated as 1)
    pub max_concurrency: usize,
    pub quality_of_service: QualityOfService,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            quality_of_service: QualityOfService::Utility,
        }
    }
}

/// Verbosity of the built-in network logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Method, URL, status and duration
    #[default]
    Lite,
    /// Everything in `Lite` plus headers and pretty-printed bodies
    Full,
}

/// Overall network configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Per-attempt timeout (default: 30 seconds)
    pub request_timeout: Duration,

    /// Deadline spanning all retry attempts (default: None)
    pub total_timeout: Option<Duration>,

    /// Maximum in-memory response body size in bytes (default: 10 MB)
    ///
    /// Downloads stream to disk and are not bound by this limit.
    pub max_body_size: usize,

    pub user_agent: String,

    /// Headers added to every request that does not already carry them
    pub default_headers: Vec<(String, String)>,

    /// Backoff retry policy, consulted after user policies (default: None)
    pub retry: Option<RetryConfig>,

    /// Connection-lost retry policy, consulted last (default: retry once)
    pub connection_lost_retry: Option<ConnectionLostRetry>,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Redirects followed per attempt; 0 disables redirect following (default: 10)
    pub max_redirects: usize,

    /// Capacity of the transport buffer in front of the connection pool (default: 1024)
    pub buffer_capacity: usize,

    /// Timeout for idle pooled connections (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// Built-in network logger verbosity; `None` disables it (default: `Lite`)
    pub log_level: Option<LogLevel>,

    pub request_queue: QueueConfig,
    pub download_queue: QueueConfig,
    pub upload_queue: QueueConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            total_timeout: None,
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: Vec::new(),
            retry: None,
            connection_lost_retry: Some(ConnectionLostRetry::default()),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            max_redirects: 10,
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            log_level: Some(LogLevel::Lite),
            request_queue: QueueConfig::default(),
            download_queue: QueueConfig::default(),
            upload_queue: QueueConfig::default(),
        }
    }
}

impl NetworkConfig {
    /// Minimal configuration: short timeout, no logger, no retries at all
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            connection_lost_retry: None,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            log_level: None,
            ..Self::default()
        }
    }

    /// Configuration for tests against local mock servers (allows insecure HTTP)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}
