use crate::encoding::{append_query, encode_body, encode_parameters, query_string};
use crate::error::EncodingError;
use crate::task::{
    Destination, JsonBodyEncoder, ParameterEncoding, Parameters, Task, UrlEncoding,
};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri};
use std::borrow::Cow;
use std::collections::BTreeSet;
use url::Url;

/// Transport-level request: method, URL, headers and a fully buffered body.
pub type WireRequest = http::Request<Bytes>;

/// Which response statuses count as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationType {
    /// Accept every status
    None,
    /// Accept 2xx
    SuccessCodes,
    /// Accept exactly these codes; an empty set disables validation
    CustomCodes(BTreeSet<u16>),
}

impl ValidationType {
    /// Custom validation from any list of status codes.
    #[must_use]
    pub fn codes(codes: impl IntoIterator<Item = u16>) -> Self {
        Self::CustomCodes(codes.into_iter().collect())
    }

    #[must_use]
    pub fn accepts(&self, status: StatusCode) -> bool {
        match self {
            Self::None => true,
            Self::SuccessCodes => status.is_success(),
            Self::CustomCodes(codes) => codes.is_empty() || codes.contains(&status.as_u16()),
        }
    }
}

/// Declarative description of one HTTP endpoint call.
///
/// Implementors describe *what* to send; the network decides how and when.
///
/// ```ignore
/// struct GetPost { id: u64 }
///
/// impl Requestable for GetPost {
///     type Response = Post;
///
///     fn base_url(&self) -> Url { Url::parse("https://api.example.com").unwrap() }
///     fn path(&self) -> Cow<'_, str> { format!("/posts/{}", self.id).into() }
///     fn method(&self) -> Method { Method::GET }
///     fn task(&self) -> Task { Task::RequestPlain }
/// }
/// ```
pub trait Requestable: Send + Sync {
    /// Type produced by the typed facade entry points.
    type Response;

    fn base_url(&self) -> Url;

    /// Path appended to the base URL.
    fn path(&self) -> Cow<'_, str>;

    fn method(&self) -> Method;

    fn validation(&self) -> ValidationType {
        ValidationType::SuccessCodes
    }

    /// Extra headers; later entries replace earlier ones with the same name.
    fn headers(&self) -> Option<Vec<(String, String)>> {
        None
    }

    /// Top-level JSON key holding the payload to decode.
    fn key_path(&self) -> Option<&str> {
        None
    }

    fn task(&self) -> Task;

    /// Encode this descriptor into a wire request.
    ///
    /// # Errors
    /// See [`encode_request`].
    fn as_wire_request(&self) -> Result<WireRequest, EncodingError> {
        encode_request(self, &self.task())
    }
}

/// Join a base URL and a path with exactly one slash at the seam.
///
/// Path segments are percent-encoded, so spaces and non-ASCII characters in
/// the path are carried rather than rejected.
///
/// # Errors
/// Fails when the result is not an absolute `http`/`https` URL.
pub fn join_url(base: &Url, path: &str) -> Result<Uri, EncodingError> {
    let invalid = |url: &Url, reason: String| EncodingError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    match base.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(base, format!("unsupported scheme '{other}'"))),
    }
    if !base.has_host() {
        return Err(invalid(base, "missing host".to_owned()));
    }

    let mut url = base.clone();
    let path = path.trim_start_matches('/');
    if !path.is_empty() {
        url.path_segments_mut()
            .map_err(|()| invalid(base, "URL cannot carry a path".to_owned()))?
            .pop_if_empty()
            .extend(path.split('/'));
    }
    url.as_str()
        .parse()
        .map_err(|e: http::uri::InvalidUri| invalid(&url, e.to_string()))
}

/// Turn a descriptor plus its task into a wire request.
///
/// Headers are applied before the task so encodings never overwrite a
/// content type the descriptor chose.
///
/// # Errors
/// Fails on an invalid URL or header, on a payload that cannot be written as
/// JSON, and when composite body parameters target anything but the body.
pub fn encode_request<R>(requestable: &R, task: &Task) -> Result<WireRequest, EncodingError>
where
    R: Requestable + ?Sized,
{
    let uri = join_url(&requestable.base_url(), &requestable.path())?;
    let mut request = WireRequest::new(Bytes::new());
    *request.method_mut() = requestable.method();
    *request.uri_mut() = uri;

    for (name, value) in requestable.headers().unwrap_or_default() {
        let name = HeaderName::try_from(name)?;
        let value = HeaderValue::try_from(value)?;
        request.headers_mut().insert(name, value);
    }

    match task {
        Task::RequestPlain | Task::DownloadDestination(_) | Task::UploadMultipart(_) => {}
        Task::RequestJsonEncodable(body) => {
            encode_body(&mut request, body.as_ref(), &JsonBodyEncoder::default())?;
        }
        Task::RequestCustomJsonEncodable { body, encoder } => {
            encode_body(&mut request, body.as_ref(), encoder.as_ref())?;
        }
        Task::RequestParameters {
            parameters,
            encoding,
        }
        | Task::DownloadParameters {
            parameters,
            encoding,
            ..
        } => encode_parameters(&mut request, parameters, *encoding)?,
        Task::RequestCompositeParameters {
            body_parameters,
            body_encoding,
            url_parameters,
        } => {
            if let ParameterEncoding::Url(url) = body_encoding
                && url.destination != Destination::HttpBody
            {
                return Err(EncodingError::DisallowedBodyEncoding {
                    destination: url.destination,
                });
            }
            encode_parameters(&mut request, body_parameters, *body_encoding)?;
            encode_url_parameters(&mut request, url_parameters)?;
        }
        Task::UploadCompositeMultipart { url_parameters, .. } => {
            encode_url_parameters(&mut request, url_parameters)?;
        }
    }

    Ok(request)
}

fn encode_url_parameters(
    request: &mut WireRequest,
    parameters: &Parameters,
) -> Result<(), EncodingError> {
    let query = query_string(parameters, &UrlEncoding::query_string());
    let uri = append_query(request.uri(), &query)?;
    *request.uri_mut() = uri;
    Ok(())
}
