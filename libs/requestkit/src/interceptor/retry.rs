use crate::config::{ConnectionLostRetry, ExponentialBackoff, RetryConfig, RetryTrigger};
use crate::error::HttpError;
use crate::response::parse_retry_after;
use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode, Uri};
use rand::Rng;
use std::time::Duration;

/// Why the last attempt is being reconsidered.
#[derive(Debug, Clone, Copy)]
pub enum AttemptFailure<'a> {
    /// The transport failed
    Error(&'a HttpError),
    /// The server answered with a status the validation policy rejects
    Status {
        status: StatusCode,
        headers: &'a HeaderMap,
    },
}

/// Everything a retry policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    /// Headers of the attempt as sent, after adapters ran
    pub request_headers: &'a HeaderMap,
    pub failure: AttemptFailure<'a>,
    /// Retries already performed for this operation, across all policies
    pub retry_count: usize,
    /// Retries this policy already granted for this operation
    pub policy_retry_count: usize,
}

/// Verdict of one policy on one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry immediately
    Retry,
    /// Retry after a delay
    RetryAfter(Duration),
    /// Stop and surface the failure
    DoNotRetry,
    /// No opinion; ask the next policy
    Decline,
}

/// Decides whether a failed attempt is retried.
///
/// Policies are consulted in registration order; the first one that does
/// not [`Decline`](RetryDecision::Decline) settles the outcome.
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    async fn decide(&self, context: &RetryContext<'_>) -> RetryDecision;
}

/// Retries once (by default) when the connection dropped mid-flight.
///
/// Always consulted after every other policy.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLostRetryPolicy {
    settings: ConnectionLostRetry,
}

impl Default for ConnectionLostRetryPolicy {
    fn default() -> Self {
        Self::new(ConnectionLostRetry::default())
    }
}

impl ConnectionLostRetryPolicy {
    #[must_use]
    pub fn new(settings: ConnectionLostRetry) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl RetryPolicy for ConnectionLostRetryPolicy {
    async fn decide(&self, context: &RetryContext<'_>) -> RetryDecision {
        let AttemptFailure::Error(err) = context.failure else {
            return RetryDecision::Decline;
        };
        if !err.is_connection_lost() || context.policy_retry_count >= self.settings.max_retries {
            return RetryDecision::Decline;
        }
        if self.settings.delay.is_zero() {
            RetryDecision::Retry
        } else {
            RetryDecision::RetryAfter(self.settings.delay)
        }
    }
}

/// Exponential backoff over configurable triggers, honoring `Retry-After`.
#[derive(Debug, Clone)]
pub struct BackoffRetryPolicy {
    config: RetryConfig,
}

impl BackoffRetryPolicy {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RetryPolicy for BackoffRetryPolicy {
    async fn decide(&self, context: &RetryContext<'_>) -> RetryDecision {
        let (trigger, retry_after) = match context.failure {
            AttemptFailure::Error(err) => (retry_trigger(err), None),
            AttemptFailure::Status { status, headers } => {
                (RetryTrigger::Status(status.as_u16()), parse_retry_after(headers))
            }
        };
        let has_idempotency_key = self
            .config
            .idempotency_key_header
            .as_ref()
            .is_some_and(|name| context.request_headers.contains_key(name));
        if !self
            .config
            .should_retry(trigger, context.method, has_idempotency_key)
        {
            return RetryDecision::Decline;
        }
        if context.policy_retry_count >= self.config.max_retries {
            return RetryDecision::DoNotRetry;
        }

        let delay = match retry_after {
            Some(delay) if !self.config.ignore_retry_after => delay,
            _ => calculate_backoff(&self.config.backoff, context.policy_retry_count),
        };
        RetryDecision::RetryAfter(delay)
    }
}

fn retry_trigger(err: &HttpError) -> RetryTrigger {
    match err {
        HttpError::Transport(_) => RetryTrigger::TransportError,
        HttpError::Timeout(_) => RetryTrigger::Timeout,
        _ => RetryTrigger::NonRetryable,
    }
}

/// Backoff for the given zero-based attempt.
///
/// NaN, infinite and negative settings fall back to safe values instead of panicking.
#[must_use]
pub fn calculate_backoff(backoff: &ExponentialBackoff, attempt: usize) -> Duration {
    const MAX_BACKOFF_SECS: f64 = 86_400.0;

    let sanitize = |value: f64, fallback: f64| {
        if value.is_finite() && value >= 0.0 {
            value
        } else {
            fallback
        }
    };
    let multiplier = sanitize(backoff.multiplier, 1.0);
    let initial = sanitize(backoff.initial.as_secs_f64(), 0.0);
    let max = sanitize(backoff.max.as_secs_f64(), MAX_BACKOFF_SECS).min(MAX_BACKOFF_SECS);

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = initial * multiplier.powi(exponent);
    let clamped = if base.is_finite() {
        base.clamp(0.0, max)
    } else {
        max
    };
    let mut delay = Duration::from_secs_f64(clamped);

    if backoff.jitter {
        let factor = rand::rng().random_range(0.0..=0.25);
        delay += delay.mul_f64(factor);
    }

    delay.min(Duration::from_secs_f64(max))
}
