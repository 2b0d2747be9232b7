use crate::error::HttpError;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use std::time::{Duration, SystemTime};

/// Type-erased response body, possibly decompressed (gzip/br/deflate).
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// What the server answered: status, headers and the buffered body.
///
/// Download snapshots carry an empty body; the payload went to disk.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseSnapshot {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8, invalid sequences replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports delay-seconds ("120") and HTTP-date values. Returns `None` when
/// the header is missing, unparseable or already in the past.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    let at = httpdate::parse_http_date(value).ok()?;
    at.duration_since(SystemTime::now()).ok()
}

/// Collect a response body, failing once it grows past `limit` bytes.
///
/// The limit applies to decompressed bytes.
///
/// # Errors
/// Returns `HttpError::BodyTooLarge` past the limit and `HttpError::Transport`
/// when reading a frame fails.
pub async fn read_body_limited(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

/// Keep at most the first `limit` bytes of a body and stop reading there.
///
/// A failing frame ends the read; whatever arrived before it is kept.
pub async fn read_body_prefix(body: ResponseBody, limit: usize) -> Bytes {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while collected.len() < limit {
        let Some(Ok(frame)) = body.frame().await else {
            break;
        };
        if let Some(chunk) = frame.data_ref() {
            let take = chunk.len().min(limit - collected.len());
            collected.extend_from_slice(&chunk[..take]);
        }
    }

    Bytes::from(collected)
}

/// Read up to `limit` bytes and drop the rest, so the connection can be reused.
///
/// # Errors
/// Returns `HttpError::Transport` when reading a frame fails.
pub async fn drain_response_body(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<(), HttpError> {
    let (_parts, body) = response.into_parts();
    let mut body = std::pin::pin!(body);
    let mut drained = 0usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            drained += chunk.len();
            if drained >= limit {
                break;
            }
        }
    }

    Ok(())
}
