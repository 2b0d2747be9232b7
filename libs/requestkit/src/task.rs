//! What a request carries: the closed set of task variants plus their
//! parameter encodings and download destinations.

use crate::multipart::MultipartFormData;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Ordered string-keyed parameters. Values may nest objects and arrays.
pub type Parameters = serde_json::Map<String, Value>;

/// Where URL-encoded parameters are placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
    /// Query string for GET, HEAD and DELETE; form body otherwise
    #[default]
    MethodDependent,
    QueryString,
    HttpBody,
}

/// How array values are keyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArrayEncoding {
    /// `key[]=a&key[]=b`
    #[default]
    Brackets,
    /// `key=a&key=b`
    NoBrackets,
}

/// How boolean values are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoolEncoding {
    /// `1` / `0`
    #[default]
    Numeric,
    /// `true` / `false`
    Literal,
}

/// URL (form) encoding options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlEncoding {
    pub destination: Destination,
    pub array_encoding: ArrayEncoding,
    pub bool_encoding: BoolEncoding,
}

impl UrlEncoding {
    #[must_use]
    pub const fn new(destination: Destination) -> Self {
        Self {
            destination,
            array_encoding: ArrayEncoding::Brackets,
            bool_encoding: BoolEncoding::Numeric,
        }
    }

    #[must_use]
    pub const fn query_string() -> Self {
        Self::new(Destination::QueryString)
    }

    #[must_use]
    pub const fn http_body() -> Self {
        Self::new(Destination::HttpBody)
    }

    #[must_use]
    pub const fn array_encoding(mut self, encoding: ArrayEncoding) -> Self {
        self.array_encoding = encoding;
        self
    }

    #[must_use]
    pub const fn bool_encoding(mut self, encoding: BoolEncoding) -> Self {
        self.bool_encoding = encoding;
        self
    }
}

/// JSON body encoding options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonEncoding {
    pub pretty: bool,
}

impl JsonEncoding {
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }
}

/// Strategy for serializing a parameter map into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterEncoding {
    Url(UrlEncoding),
    Json(JsonEncoding),
}

impl Default for ParameterEncoding {
    fn default() -> Self {
        Self::Url(UrlEncoding::default())
    }
}

impl From<UrlEncoding> for ParameterEncoding {
    fn from(encoding: UrlEncoding) -> Self {
        Self::Url(encoding)
    }
}

impl From<JsonEncoding> for ParameterEncoding {
    fn from(encoding: JsonEncoding) -> Self {
        Self::Json(encoding)
    }
}

/// A payload that can render itself as a JSON document.
///
/// Implemented for every `Serialize` type; the task stores it type-erased.
pub trait EncodableBody: Send + Sync {
    /// # Errors
    /// Fails when the value cannot be represented as JSON (e.g. non-string map keys).
    fn to_json_value(&self) -> Result<Value, serde_json::Error>;
}

impl<T> EncodableBody for T
where
    T: Serialize + Send + Sync,
{
    fn to_json_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Caller-supplied JSON writer for `RequestCustomJsonEncodable`.
pub trait BodyEncoder: Send + Sync {
    /// Content type written when the request has none (default: `application/json`).
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    /// # Errors
    /// Fails when the document cannot be written.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, serde_json::Error>;
}

/// Plain `serde_json` writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBodyEncoder {
    pub pretty: bool,
}

impl BodyEncoder for JsonBodyEncoder {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, serde_json::Error> {
        if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
    }
}

/// Knobs applied when a download lands on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Create missing parent directories (default: true)
    pub create_intermediate_directories: bool,
    /// Replace an existing file at the final path (default: true)
    pub remove_previous_file: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            create_intermediate_directories: true,
            remove_previous_file: true,
        }
    }
}

/// Where a downloaded body is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadDestination {
    /// Inside `directory`, named after `Content-Disposition` or the URL's last segment
    Suggested {
        directory: PathBuf,
        options: DownloadOptions,
    },
    /// Exactly at `path`
    Exact {
        path: PathBuf,
        options: DownloadOptions,
    },
}

impl Default for DownloadDestination {
    fn default() -> Self {
        Self::suggested(std::env::temp_dir())
    }
}

impl DownloadDestination {
    #[must_use]
    pub fn suggested(directory: impl Into<PathBuf>) -> Self {
        Self::Suggested {
            directory: directory.into(),
            options: DownloadOptions::default(),
        }
    }

    #[must_use]
    pub fn exact(path: impl Into<PathBuf>) -> Self {
        Self::Exact {
            path: path.into(),
            options: DownloadOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(self, options: DownloadOptions) -> Self {
        match self {
            Self::Suggested { directory, .. } => Self::Suggested { directory, options },
            Self::Exact { path, .. } => Self::Exact { path, options },
        }
    }

    #[must_use]
    pub fn options(&self) -> DownloadOptions {
        match self {
            Self::Suggested { options, .. } | Self::Exact { options, .. } => *options,
        }
    }

    /// Final path for a response with these headers, fetched from `uri`.
    #[must_use]
    pub fn resolve(&self, headers: &http::HeaderMap, uri: &http::Uri) -> PathBuf {
        match self {
            Self::Exact { path, .. } => path.clone(),
            Self::Suggested { directory, .. } => {
                let name = headers
                    .get(http::header::CONTENT_DISPOSITION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(disposition_filename)
                    .or_else(|| uri.path().rsplit('/').find(|s| !s.is_empty()).map(str::to_owned))
                    .and_then(|name| sanitize_file_name(&name))
                    .unwrap_or_else(|| "download".to_owned());
                directory.join(name)
            }
        }
    }
}

fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let raw = raw.trim().trim_matches('"');
        Some(urlencoding::decode(raw).map_or_else(|_| raw.to_owned(), |s| s.into_owned()))
    })
}

// Keep only the final component so a hostile name cannot escape the directory.
fn sanitize_file_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_owned)
}

/// The three kinds of transport primitive a task maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Request,
    Download,
    Upload,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::Download => "download",
            Self::Upload => "upload",
        })
    }
}

/// Closed set of request payload shapes.
#[derive(Clone)]
pub enum Task {
    /// No body, no parameters
    RequestPlain,
    /// Body is the JSON serialization of a payload
    RequestJsonEncodable(Arc<dyn EncodableBody>),
    /// Body is written by a caller-supplied encoder
    RequestCustomJsonEncodable {
        body: Arc<dyn EncodableBody>,
        encoder: Arc<dyn BodyEncoder>,
    },
    /// Parameters placed per `encoding`
    RequestParameters {
        parameters: Parameters,
        encoding: ParameterEncoding,
    },
    /// Body parameters in the body, URL parameters in the query
    RequestCompositeParameters {
        body_parameters: Parameters,
        body_encoding: ParameterEncoding,
        url_parameters: Parameters,
    },
    /// Multipart form upload
    UploadMultipart(MultipartFormData),
    /// Multipart form upload plus query parameters
    UploadCompositeMultipart {
        form: MultipartFormData,
        url_parameters: Parameters,
    },
    /// Download to a destination
    DownloadDestination(DownloadDestination),
    /// Download with parameters
    DownloadParameters {
        parameters: Parameters,
        encoding: ParameterEncoding,
        destination: DownloadDestination,
    },
}

impl Task {
    /// JSON body task for any serializable payload.
    #[must_use]
    pub fn json<T>(body: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::RequestJsonEncodable(Arc::new(body))
    }

    /// JSON body task written by `encoder`.
    #[must_use]
    pub fn custom_json<T, E>(body: T, encoder: E) -> Self
    where
        T: Serialize + Send + Sync + 'static,
        E: BodyEncoder + 'static,
    {
        Self::RequestCustomJsonEncodable {
            body: Arc::new(body),
            encoder: Arc::new(encoder),
        }
    }

    #[must_use]
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::RequestPlain
            | Self::RequestJsonEncodable(_)
            | Self::RequestCustomJsonEncodable { .. }
            | Self::RequestParameters { .. }
            | Self::RequestCompositeParameters { .. } => TaskKind::Request,
            Self::UploadMultipart(_) | Self::UploadCompositeMultipart { .. } => TaskKind::Upload,
            Self::DownloadDestination(_) | Self::DownloadParameters { .. } => TaskKind::Download,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestPlain => f.write_str("RequestPlain"),
            Self::RequestJsonEncodable(_) => f.write_str("RequestJsonEncodable(..)"),
            Self::RequestCustomJsonEncodable { .. } => {
                f.write_str("RequestCustomJsonEncodable { .. }")
            }
            Self::RequestParameters {
                parameters,
                encoding,
            } => f
                .debug_struct("RequestParameters")
                .field("parameters", parameters)
                .field("encoding", encoding)
                .finish(),
            Self::RequestCompositeParameters {
                body_parameters,
                body_encoding,
                url_parameters,
            } => f
                .debug_struct("RequestCompositeParameters")
                .field("body_parameters", body_parameters)
                .field("body_encoding", body_encoding)
                .field("url_parameters", url_parameters)
                .finish(),
            Self::UploadMultipart(form) => f.debug_tuple("UploadMultipart").field(form).finish(),
            Self::UploadCompositeMultipart {
                form,
                url_parameters,
            } => f
                .debug_struct("UploadCompositeMultipart")
                .field("form", form)
                .field("url_parameters", url_parameters)
                .finish(),
            Self::DownloadDestination(destination) => f
                .debug_tuple("DownloadDestination")
                .field(destination)
                .finish(),
            Self::DownloadParameters {
                parameters,
                encoding,
                destination,
            } => f
                .debug_struct("DownloadParameters")
                .field("parameters", parameters)
                .field("encoding", encoding)
                .field("destination", destination)
                .finish(),
        }
    }
}
