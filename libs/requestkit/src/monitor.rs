//! Request lifecycle observers.

use crate::config::LogLevel;
use crate::error::HttpError;
use crate::response::ResponseSnapshot;
use crate::session::RequestSummary;
use crate::task::TaskKind;
use bytes::Bytes;
use http::HeaderMap;
use std::time::Duration;

/// A finished request, as seen by [`EventMonitor`]s.
#[derive(Debug, Clone, Copy)]
pub struct RequestEvent<'a> {
    pub kind: TaskKind,
    pub request: &'a RequestSummary,
    pub response: Option<&'a ResponseSnapshot>,
    pub error: Option<&'a HttpError>,
    pub duration: Duration,
}

/// Observer notified once per transport call, after retries are exhausted.
///
/// Called on the transport task; implementations must not block.
pub trait EventMonitor: Send + Sync {
    fn request_did_finish(&self, event: &RequestEvent<'_>);
}

/// Logs every finished request under the `requestkit::network` target.
///
/// `Lite` logs the URL without its query, the status and the duration.
/// `Full` adds headers and bodies; JSON bodies are pretty-printed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkLogger {
    level: LogLevel,
}

impl NetworkLogger {
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }
}

impl EventMonitor for NetworkLogger {
    fn request_did_finish(&self, event: &RequestEvent<'_>) {
        let uri = &event.request.uri;
        let url = format!(
            "{}://{}{}",
            uri.scheme_str().unwrap_or("http"),
            uri.authority().map_or("", http::uri::Authority::as_str),
            uri.path()
        );
        let status = event.response.map(|r| r.status().as_u16());
        let duration_ms = u64::try_from(event.duration.as_millis()).unwrap_or(u64::MAX);
        let error = event.error.map(ToString::to_string);

        match self.level {
            LogLevel::Lite => {
                tracing::info!(
                    target: "requestkit::network",
                    kind = %event.kind,
                    method = %event.request.method,
                    url = %url,
                    status,
                    duration_ms,
                    error,
                    "request finished"
                );
            }
            LogLevel::Full => {
                let request_headers = render_headers(&event.request.headers);
                let request_body = render_body(&event.request.body);
                let response_headers = event.response.map(|r| render_headers(r.headers()));
                let response_body = event.response.and_then(|r| render_body(r.body()));
                tracing::info!(
                    target: "requestkit::network",
                    kind = %event.kind,
                    method = %event.request.method,
                    url = %url,
                    status,
                    duration_ms,
                    error,
                    request_headers = %request_headers,
                    request_body,
                    response_headers,
                    response_body,
                    "request finished"
                );
            }
        }
    }
}

fn render_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if value.is_sensitive() {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            format!("{name}: {value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_body(body: &Bytes) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body)
        && let Ok(pretty) = serde_json::to_string_pretty(&json)
    {
        return Some(pretty);
    }
    Some(format!("<{} bytes>", body.len()))
}
