use crate::error::HttpError;
use http::header::{HeaderName, USER_AGENT};
use http::{HeaderValue, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer adding the user agent and configured default headers
/// to every request that does not already carry them.
#[derive(Clone)]
pub struct DefaultHeadersLayer {
    headers: Arc<[(HeaderName, HeaderValue)]>,
}

impl DefaultHeadersLayer {
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName`/`InvalidHeaderValue` for malformed entries.
    pub fn try_new(user_agent: &str, defaults: &[(String, String)]) -> Result<Self, HttpError> {
        let mut headers = Vec::with_capacity(defaults.len() + 1);
        headers.push((USER_AGENT, HeaderValue::from_str(user_agent)?));
        for (name, value) in defaults {
            headers.push((
                HeaderName::try_from(name.as_str())?,
                HeaderValue::from_str(value)?,
            ));
        }
        Ok(Self {
            headers: headers.into(),
        })
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

/// Service produced by [`DefaultHeadersLayer`].
#[derive(Clone)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: Arc<[(HeaderName, HeaderValue)]>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        for (name, value) in self.headers.iter() {
            if !req.headers().contains_key(name) {
                req.headers_mut().insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}
