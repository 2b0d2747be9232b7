use super::adapter::RequestAdapter;
use super::retry::{AttemptFailure, RetryContext, RetryDecision, RetryPolicy};
use crate::config::RETRY_RESPONSE_DRAIN_LIMIT;
use crate::error::HttpError;
use crate::requestable::{ValidationType, WireRequest};
use crate::response::{ResponseBody, drain_response_body};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Request, Response, Uri};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service, ServiceExt};

/// Header carrying the retry number (1-indexed) on retried attempts.
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// Ordered request adapters plus ordered retry policies.
#[derive(Clone, Default)]
pub struct Interceptor {
    adapters: Vec<Arc<dyn RequestAdapter>>,
    policies: Vec<Arc<dyn RetryPolicy>>,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("adapters", &self.adapters.len())
            .field("policies", &self.policies.len())
            .finish()
    }
}

impl Interceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter; adapters run in registration order.
    pub fn push_adapter(&mut self, adapter: Arc<dyn RequestAdapter>) {
        self.adapters.push(adapter);
    }

    /// Register a policy; policies are consulted in registration order.
    pub fn push_policy(&mut self, policy: Arc<dyn RetryPolicy>) {
        self.policies.push(policy);
    }

    #[must_use]
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    /// Run every adapter in order over the request.
    ///
    /// # Errors
    /// Returns `HttpError::Adapter` with the first adapter failure.
    pub async fn adapt(&self, mut request: WireRequest) -> Result<WireRequest, HttpError> {
        for adapter in &self.adapters {
            request = adapter.adapt(request).await.map_err(HttpError::Adapter)?;
        }
        Ok(request)
    }

    /// Consult policies in order; returns the claiming policy and its delay
    /// when the attempt should be retried.
    async fn consult(
        &self,
        attempt: &Attempt,
        failure: AttemptFailure<'_>,
        retry_count: usize,
        policy_retries: &[usize],
    ) -> Option<(usize, Duration)> {
        for (index, policy) in self.policies.iter().enumerate() {
            let context = RetryContext {
                method: &attempt.method,
                uri: &attempt.uri,
                request_headers: &attempt.headers,
                failure,
                retry_count,
                policy_retry_count: policy_retries[index],
            };
            match policy.decide(&context).await {
                RetryDecision::Retry => return Some((index, Duration::ZERO)),
                RetryDecision::RetryAfter(delay) => return Some((index, delay)),
                RetryDecision::DoNotRetry => return None,
                RetryDecision::Decline => {}
            }
        }
        None
    }
}

struct Attempt {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

/// Tower layer running adapters before, and retry policies after, each attempt.
#[derive(Clone)]
pub struct InterceptorLayer {
    interceptor: Arc<Interceptor>,
    total_timeout: Option<Duration>,
}

impl InterceptorLayer {
    #[must_use]
    pub fn new(interceptor: Interceptor, total_timeout: Option<Duration>) -> Self {
        Self {
            interceptor: Arc::new(interceptor),
            total_timeout,
        }
    }
}

impl<S> Layer<S> for InterceptorLayer {
    type Service = InterceptorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InterceptorService {
            inner,
            interceptor: Arc::clone(&self.interceptor),
            total_timeout: self.total_timeout,
        }
    }
}

/// Service produced by [`InterceptorLayer`].
///
/// A response whose status the request's [`ValidationType`] (carried in the
/// request extensions) rejects is offered to the policies like an error. When
/// no policy claims it, it is returned as `Ok` for the caller to validate.
#[derive(Clone)]
pub struct InterceptorService<S> {
    inner: S,
    interceptor: Arc<Interceptor>,
    total_timeout: Option<Duration>,
}

impl<S> Service<Request<Bytes>> for InterceptorService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Bytes>) -> Self::Future {
        // Swap so we consume the instance that was poll_ready'd.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = Arc::clone(&self.interceptor);
        let total_timeout = self.total_timeout;

        let (parts, body) = req.into_parts();
        let validation = parts.extensions.get::<ValidationType>().cloned();

        Box::pin(async move {
            let deadline = total_timeout.map(|t| (tokio::time::Instant::now() + t, t));
            let mut policy_retries = vec![0usize; interceptor.policy_count()];
            let mut retry_count = 0usize;

            loop {
                if let Some((deadline, limit)) = deadline
                    && tokio::time::Instant::now() >= deadline
                {
                    return Err(HttpError::DeadlineExceeded(limit));
                }

                let mut request = Request::from_parts(parts.clone(), body.clone());
                if retry_count > 0
                    && let Ok(value) = HeaderValue::try_from(retry_count.to_string())
                {
                    request.headers_mut().insert(RETRY_ATTEMPT_HEADER, value);
                }
                let (adapted, adapted_body) = interceptor.adapt(request).await?.into_parts();
                let attempt = Attempt {
                    method: adapted.method.clone(),
                    uri: adapted.uri.clone(),
                    headers: adapted.headers.clone(),
                };

                let mut svc = inner.clone();
                svc.ready().await?;
                let result = svc
                    .call(Request::from_parts(adapted, Full::new(adapted_body)))
                    .await;

                let rejected = match &result {
                    Ok(resp) => validation
                        .as_ref()
                        .is_some_and(|v| !v.accepts(resp.status())),
                    Err(_) => true,
                };
                if !rejected {
                    return result;
                }
                let failure = match &result {
                    Ok(resp) => AttemptFailure::Status {
                        status: resp.status(),
                        headers: resp.headers(),
                    },
                    Err(err) => AttemptFailure::Error(err),
                };
                let Some((index, delay)) = interceptor
                    .consult(&attempt, failure, retry_count, &policy_retries)
                    .await
                else {
                    return result;
                };

                let delay = match deadline {
                    Some((deadline, limit)) => {
                        let remaining =
                            deadline.saturating_duration_since(tokio::time::Instant::now());
                        if remaining.is_zero() {
                            return Err(HttpError::DeadlineExceeded(limit));
                        }
                        delay.min(remaining)
                    }
                    None => delay,
                };

                match result {
                    Ok(resp) => {
                        tracing::debug!(
                            retry = retry_count + 1,
                            status = resp.status().as_u16(),
                            method = %attempt.method,
                            host = attempt.uri.host().unwrap_or("unknown"),
                            backoff_ms = delay.as_millis(),
                            "Retrying request after rejected status"
                        );
                        if let Err(e) = drain_response_body(resp, RETRY_RESPONSE_DRAIN_LIMIT).await {
                            tracing::debug!(
                                error = %e,
                                "Failed to drain response body before retry; connection may not be reused"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::debug!(
                            retry = retry_count + 1,
                            error = %err,
                            method = %attempt.method,
                            host = attempt.uri.host().unwrap_or("unknown"),
                            backoff_ms = delay.as_millis(),
                            "Retrying request after error"
                        );
                    }
                }

                policy_retries[index] += 1;
                retry_count += 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::ConnectionLostRetry;
    use crate::error::BoxError;
    use crate::interceptor::ConnectionLostRetryPolicy;
    use async_trait::async_trait;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn make_response_body(data: &[u8]) -> ResponseBody {
        Full::new(Bytes::from(data.to_vec()))
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            .boxed()
    }

    enum Scripted {
        Status(StatusCode),
        Reset,
        Timeout,
    }

    /// Replays a scripted sequence of outcomes and records every request it sees.
    #[derive(Clone)]
    struct ScriptedService {
        script: Arc<Mutex<VecDeque<Scripted>>>,
        seen: Arc<Mutex<Vec<Request<Full<Bytes>>>>>,
    }

    impl ScriptedService {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Service<Request<Full<Bytes>>> for ScriptedService {
        type Response = Response<ResponseBody>;
        type Error = HttpError;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            self.seen.lock().unwrap().push(req);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Scripted::Status(StatusCode::OK));
            Box::pin(async move {
                match next {
                    Scripted::Status(status) => Ok(Response::builder()
                        .status(status)
                        .body(make_response_body(b"body"))
                        .unwrap()),
                    Scripted::Reset => Err(HttpError::Transport(Box::new(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "reset",
                    )))),
                    Scripted::Timeout => Err(HttpError::Timeout(Duration::from_secs(1))),
                }
            })
        }
    }

    /// Claims one immediate retry on any rejected status.
    struct RetryStatusOnce;

    #[async_trait]
    impl RetryPolicy for RetryStatusOnce {
        async fn decide(&self, context: &RetryContext<'_>) -> RetryDecision {
            match context.failure {
                AttemptFailure::Status { .. } if context.policy_retry_count == 0 => {
                    RetryDecision::Retry
                }
                _ => RetryDecision::Decline,
            }
        }
    }

    struct AlwaysDecline;

    #[async_trait]
    impl RetryPolicy for AlwaysDecline {
        async fn decide(&self, _context: &RetryContext<'_>) -> RetryDecision {
            RetryDecision::Decline
        }
    }

    struct Refuse;

    #[async_trait]
    impl RetryPolicy for Refuse {
        async fn decide(&self, _context: &RetryContext<'_>) -> RetryDecision {
            RetryDecision::DoNotRetry
        }
    }

    struct TagAdapter;

    #[async_trait]
    impl RequestAdapter for TagAdapter {
        async fn adapt(&self, mut request: WireRequest) -> Result<WireRequest, BoxError> {
            request
                .headers_mut()
                .insert("x-tag", HeaderValue::from_static("adapted"));
            Ok(request)
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl RequestAdapter for FailingAdapter {
        async fn adapt(&self, _request: WireRequest) -> Result<WireRequest, BoxError> {
            Err("no credentials".into())
        }
    }

    fn request(method: Method, validation: Option<ValidationType>) -> Request<Bytes> {
        let mut request = Request::builder()
            .method(method)
            .uri("http://example.com/items")
            .body(Bytes::from_static(b"payload"))
            .unwrap();
        if let Some(validation) = validation {
            request.extensions_mut().insert(validation);
        }
        request
    }

    fn service(interceptor: Interceptor, inner: ScriptedService) -> InterceptorService<ScriptedService> {
        InterceptorLayer::new(interceptor, None).layer(inner)
    }

    #[tokio::test]
    async fn test_success_passes_through_once() {
        let inner = ScriptedService::new(vec![]);
        let mut svc = service(Interceptor::new(), inner.clone());
        let resp = svc
            .call(request(Method::GET, Some(ValidationType::SuccessCodes)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_declining_policy_then_claiming_policy_retries_exactly_once() {
        let inner = ScriptedService::new(vec![
            Scripted::Status(StatusCode::SERVICE_UNAVAILABLE),
            Scripted::Status(StatusCode::SERVICE_UNAVAILABLE),
        ]);
        let mut interceptor = Interceptor::new();
        interceptor.push_policy(Arc::new(AlwaysDecline));
        interceptor.push_policy(Arc::new(RetryStatusOnce));
        let mut svc = service(interceptor, inner.clone());

        let resp = svc
            .call(request(Method::POST, Some(ValidationType::SuccessCodes)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(inner.calls(), 2);

        let seen = inner.seen.lock().unwrap();
        assert!(seen[0].headers().get(RETRY_ATTEMPT_HEADER).is_none());
        assert_eq!(seen[1].headers()[RETRY_ATTEMPT_HEADER], "1");
    }

    #[tokio::test]
    async fn test_do_not_retry_short_circuits_later_policies() {
        let inner = ScriptedService::new(vec![Scripted::Status(StatusCode::BAD_GATEWAY)]);
        let mut interceptor = Interceptor::new();
        interceptor.push_policy(Arc::new(Refuse));
        interceptor.push_policy(Arc::new(RetryStatusOnce));
        let mut svc = service(interceptor, inner.clone());

        let resp = svc
            .call(request(Method::GET, Some(ValidationType::SuccessCodes)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_statuses_accepted_by_validation_are_not_offered_to_policies() {
        let inner = ScriptedService::new(vec![Scripted::Status(StatusCode::NOT_FOUND)]);
        let mut interceptor = Interceptor::new();
        interceptor.push_policy(Arc::new(RetryStatusOnce));
        let mut svc = service(interceptor, inner.clone());

        let resp = svc
            .call(request(Method::GET, Some(ValidationType::codes([200, 404]))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_connection_lost_policy_retries_once_then_surfaces() {
        let inner = ScriptedService::new(vec![Scripted::Reset, Scripted::Reset]);
        let mut interceptor = Interceptor::new();
        interceptor.push_policy(Arc::new(ConnectionLostRetryPolicy::new(
            ConnectionLostRetry::default(),
        )));
        let mut svc = service(interceptor, inner.clone());

        let err = svc.call(request(Method::POST, None)).await.unwrap_err();
        assert!(err.is_connection_lost());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_unclaimed_error_surfaces_without_retry() {
        let inner = ScriptedService::new(vec![Scripted::Timeout]);
        let mut interceptor = Interceptor::new();
        interceptor.push_policy(Arc::new(ConnectionLostRetryPolicy::default()));
        let mut svc = service(interceptor, inner.clone());

        let err = svc.call(request(Method::GET, None)).await.unwrap_err();
        assert!(matches!(err, HttpError::Timeout(_)));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_adapters_run_on_every_attempt_and_keep_body() {
        let inner = ScriptedService::new(vec![Scripted::Reset]);
        let mut interceptor = Interceptor::new();
        interceptor.push_adapter(Arc::new(TagAdapter));
        interceptor.push_policy(Arc::new(ConnectionLostRetryPolicy::default()));
        let mut svc = service(interceptor, inner.clone());

        svc.call(request(Method::PUT, None)).await.unwrap();
        let seen = std::mem::take(&mut *inner.seen.lock().unwrap());
        assert_eq!(seen.len(), 2);
        for req in seen {
            assert_eq!(req.headers()["x-tag"], "adapted");
            let body = req.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(body, Bytes::from_static(b"payload"));
        }
    }

    #[tokio::test]
    async fn test_adapter_failure_aborts_before_transport() {
        let inner = ScriptedService::new(vec![]);
        let mut interceptor = Interceptor::new();
        interceptor.push_adapter(Arc::new(FailingAdapter));
        let mut svc = service(interceptor, inner.clone());

        let err = svc.call(request(Method::GET, None)).await.unwrap_err();
        assert!(matches!(err, HttpError::Adapter(_)));
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test]
    async fn test_total_timeout_stops_retry_loop() {
        struct SlowRetry;

        #[async_trait]
        impl RetryPolicy for SlowRetry {
            async fn decide(&self, _context: &RetryContext<'_>) -> RetryDecision {
                RetryDecision::RetryAfter(Duration::from_millis(30))
            }
        }

        let inner = ScriptedService::new((0..100).map(|_| Scripted::Reset).collect());
        let mut interceptor = Interceptor::new();
        interceptor.push_policy(Arc::new(SlowRetry));
        let mut svc =
            InterceptorLayer::new(interceptor, Some(Duration::from_millis(100))).layer(inner.clone());

        let err = svc.call(request(Method::GET, None)).await.unwrap_err();
        assert!(matches!(err, HttpError::DeadlineExceeded(_)));
        assert!(inner.calls() < 100);
    }
}
