use crate::encoding::append_query;
use crate::error::BoxError;
use crate::requestable::WireRequest;
use crate::task::{Parameters, UrlEncoding};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use http::HeaderValue;
use http::header::{AUTHORIZATION, HeaderName};
use std::fmt;

/// Transforms a request before every attempt, retries included.
#[async_trait]
pub trait RequestAdapter: Send + Sync {
    /// # Errors
    /// A failing adapter aborts the operation with `HttpError::Adapter`.
    async fn adapt(&self, request: WireRequest) -> Result<WireRequest, BoxError>;
}

/// Credentials written by [`AuthenticationAdapter`].
#[derive(Clone, PartialEq, Eq)]
pub enum Authentication {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `Authorization: Basic <token>`, token already base64-encoded
    Basic(String),
    /// `Authorization: Basic base64(username:password)`
    Credential { username: String, password: String },
    /// `<name>: <token>`
    Custom { name: String, token: String },
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::Basic(_) => f.debug_tuple("Basic").field(&"[REDACTED]").finish(),
            Self::Credential { username, .. } => f
                .debug_struct("Credential")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Custom { name, .. } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("token", &"[REDACTED]")
                .finish(),
        }
    }
}

impl Authentication {
    fn header(&self) -> Result<(HeaderName, HeaderValue), BoxError> {
        let (name, raw) = match self {
            Self::Bearer(token) => (AUTHORIZATION, format!("Bearer {token}")),
            Self::Basic(token) => (AUTHORIZATION, format!("Basic {token}")),
            Self::Credential { username, password } => {
                let encoded = general_purpose::STANDARD.encode(format!("{username}:{password}"));
                (AUTHORIZATION, format!("Basic {encoded}"))
            }
            Self::Custom { name, token } => (HeaderName::try_from(name.as_str())?, token.clone()),
        };
        let mut value = HeaderValue::try_from(raw)?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

/// Sets one authentication header, replacing any previous value.
#[derive(Debug, Clone)]
pub struct AuthenticationAdapter {
    authentication: Authentication,
}

impl AuthenticationAdapter {
    #[must_use]
    pub fn new(authentication: Authentication) -> Self {
        Self { authentication }
    }
}

#[async_trait]
impl RequestAdapter for AuthenticationAdapter {
    async fn adapt(&self, mut request: WireRequest) -> Result<WireRequest, BoxError> {
        let (name, value) = self.authentication.header()?;
        request.headers_mut().insert(name, value);
        Ok(request)
    }
}

/// Adds a fixed API-key query parameter to every request.
#[derive(Clone)]
pub struct ParamKeyAdapter {
    name: String,
    value: String,
}

impl fmt::Debug for ParamKeyAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamKeyAdapter")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl ParamKeyAdapter {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl RequestAdapter for ParamKeyAdapter {
    async fn adapt(&self, mut request: WireRequest) -> Result<WireRequest, BoxError> {
        let mut parameters = Parameters::new();
        parameters.insert(self.name.clone(), self.value.clone().into());
        let query = crate::encoding::query_string(&parameters, &UrlEncoding::query_string());
        let uri = append_query(request.uri(), &query)?;
        *request.uri_mut() = uri;
        Ok(request)
    }
}
