use crate::config::TransportSecurity;
use crate::error::{BoxError, HttpError};
use crate::monitor::{EventMonitor, RequestEvent};
use crate::multipart::MultipartFormData;
use crate::requestable::{ValidationType, WireRequest};
use crate::response::{ResponseBody, ResponseSnapshot, read_body_limited, read_body_prefix};
use crate::task::{DownloadDestination, DownloadOptions, TaskKind};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Request, Response, Uri};
use http_body_util::BodyExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tower::buffer::Buffer;
use tower::{Service, ServiceExt};

/// Bytes of a rejected download body kept in the snapshot for diagnostics
const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Type-erased future returned by the transport stack.
pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// Transport stack behind a buffer, cloneable and shareable across tasks.
pub type BufferedService = Buffer<Request<Bytes>, ServiceFuture>;

/// Transfer progress of an upload or download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    /// Unknown when the server sends no `Content-Length`
    pub total: Option<u64>,
}

impl Progress {
    /// Completed share in `0.0..=1.0`, when the total is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some(self.completed as f64 / total as f64),
            None => None,
        }
    }
}

/// Progress callback, invoked from the transport task.
pub type ProgressHandler = Arc<dyn Fn(Progress) + Send + Sync>;

/// The request as it was handed to the transport.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestSummary {
    fn of(request: &WireRequest) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            body: request.body().clone(),
        }
    }
}

/// Result of a data or upload primitive.
#[derive(Debug)]
pub struct DataResponse {
    pub request: RequestSummary,
    pub response: Option<ResponseSnapshot>,
    pub result: Result<Bytes, HttpError>,
    pub duration: Duration,
}

/// Result of a download primitive.
#[derive(Debug)]
pub struct DownloadResponse {
    pub request: RequestSummary,
    pub response: Option<ResponseSnapshot>,
    /// Final location of the downloaded file
    pub result: Result<PathBuf, HttpError>,
    pub duration: Duration,
}

/// The transport collaborator: turns wire requests into data, files or uploads.
///
/// Owns the tower stack (interceptor, timeout, default headers,
/// decompression, redirects, pooled hyper client) and the event monitors.
#[derive(Clone)]
pub struct Session {
    service: BufferedService,
    max_body_size: usize,
    transport_security: TransportSecurity,
    monitors: Arc<[Arc<dyn EventMonitor>]>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("max_body_size", &self.max_body_size)
            .field("transport_security", &self.transport_security)
            .field("monitors", &self.monitors.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn new(
        service: BufferedService,
        max_body_size: usize,
        transport_security: TransportSecurity,
        monitors: Vec<Arc<dyn EventMonitor>>,
    ) -> Self {
        Self {
            service,
            max_body_size,
            transport_security,
            monitors: monitors.into(),
        }
    }

    /// Send the request and buffer the response body in memory.
    pub async fn data(&self, request: WireRequest, validation: ValidationType) -> DataResponse {
        self.perform(request, validation, TaskKind::Request).await
    }

    /// Encode the form as the request body, then send it like [`Session::data`].
    ///
    /// Progress is reported when the body is ready (0 of total) and once the
    /// server accepted it (total of total).
    pub async fn upload(
        &self,
        mut request: WireRequest,
        validation: ValidationType,
        form: MultipartFormData,
        progress: Option<ProgressHandler>,
    ) -> DataResponse {
        let started = Instant::now();
        let encoded = match form.encode().await {
            Ok(encoded) => encoded,
            Err(err) => {
                let data = DataResponse {
                    request: RequestSummary::of(&request),
                    response: None,
                    result: Err(HttpError::Io(err)),
                    duration: started.elapsed(),
                };
                self.notify(TaskKind::Upload, &data.request, None, data.result.as_ref().err(), data.duration);
                return data;
            }
        };

        let total = encoded.body.len() as u64;
        if let Ok(value) = HeaderValue::try_from(encoded.content_type) {
            request.headers_mut().insert(CONTENT_TYPE, value);
        }
        *request.body_mut() = encoded.body;
        report(progress.as_ref(), 0, Some(total));

        let data = self.perform(request, validation, TaskKind::Upload).await;
        if data.result.is_ok() {
            report(progress.as_ref(), total, Some(total));
        }
        data
    }

    /// Send the request and stream an accepted response body to disk.
    ///
    /// The body lands in a temporary sibling file first and is renamed into
    /// place only once complete, so a failed download never leaves a partial
    /// file at the destination.
    pub async fn download(
        &self,
        request: WireRequest,
        validation: ValidationType,
        destination: DownloadDestination,
        progress: Option<ProgressHandler>,
    ) -> DownloadResponse {
        let started = Instant::now();
        let summary = RequestSummary::of(&request);

        let (response, result) = match self.execute(request, &validation).await {
            Err(err) => (None, Err(err)),
            Ok(response) => {
                let (parts, body) = response.into_parts();
                if validation.accepts(parts.status) {
                    let path = destination.resolve(&parts.headers, &summary.uri);
                    let total = content_length(&parts.headers);
                    let written =
                        write_to_file(body, &path, destination.options(), total, progress.as_ref())
                            .await;
                    let snapshot = ResponseSnapshot::new(parts.status, parts.headers, Bytes::new());
                    (Some(snapshot), written.map(|()| path))
                } else {
                    let preview = read_body_prefix(body, ERROR_BODY_PREVIEW_LIMIT).await;
                    let status = parts.status;
                    let snapshot = ResponseSnapshot::new(status, parts.headers, preview);
                    (Some(snapshot), Err(HttpError::Validation { status }))
                }
            }
        };

        let download = DownloadResponse {
            request: summary,
            response,
            result,
            duration: started.elapsed(),
        };
        self.notify(
            TaskKind::Download,
            &download.request,
            download.response.as_ref(),
            download.result.as_ref().err(),
            download.duration,
        );
        download
    }

    async fn perform(
        &self,
        request: WireRequest,
        validation: ValidationType,
        kind: TaskKind,
    ) -> DataResponse {
        let started = Instant::now();
        let summary = RequestSummary::of(&request);

        let (response, result) = match self.execute(request, &validation).await {
            Err(err) => (None, Err(err)),
            Ok(response) => {
                let (parts, body) = response.into_parts();
                let status = parts.status;
                if validation.accepts(status) {
                    match read_body_limited(body, self.max_body_size).await {
                        Ok(bytes) => (
                            Some(ResponseSnapshot::new(status, parts.headers, bytes.clone())),
                            Ok(bytes),
                        ),
                        Err(err) => (
                            Some(ResponseSnapshot::new(status, parts.headers, Bytes::new())),
                            Err(err),
                        ),
                    }
                } else {
                    // Rejected bodies are diagnostics: keep what fits under the limit.
                    let preview = read_body_prefix(body, self.max_body_size).await;
                    (
                        Some(ResponseSnapshot::new(status, parts.headers, preview)),
                        Err(HttpError::Validation { status }),
                    )
                }
            }
        };

        let data = DataResponse {
            request: summary,
            response,
            result,
            duration: started.elapsed(),
        };
        self.notify(
            kind,
            &data.request,
            data.response.as_ref(),
            data.result.as_ref().err(),
            data.duration,
        );
        data
    }

    async fn execute(
        &self,
        mut request: WireRequest,
        validation: &ValidationType,
    ) -> Result<Response<ResponseBody>, HttpError> {
        self.check_transport(request.uri())?;
        request.extensions_mut().insert(validation.clone());

        let mut service = self.service.clone();
        service.ready().await.map_err(map_buffer_error)?;
        service.call(request).await.map_err(map_buffer_error)
    }

    fn check_transport(&self, uri: &Uri) -> Result<(), HttpError> {
        match uri.scheme_str() {
            Some("https") => Ok(()),
            Some("http") if self.transport_security == TransportSecurity::AllowInsecureHttp => {
                Ok(())
            }
            Some("http") => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
            other => Err(HttpError::InvalidScheme {
                scheme: other.unwrap_or_default().to_owned(),
                reason: "only http:// and https:// are supported".to_owned(),
            }),
        }
    }

    fn notify(
        &self,
        kind: TaskKind,
        request: &RequestSummary,
        response: Option<&ResponseSnapshot>,
        error: Option<&HttpError>,
        duration: Duration,
    ) {
        let event = RequestEvent {
            kind,
            request,
            response,
            error,
            duration,
        };
        for monitor in self.monitors.iter() {
            monitor.request_did_finish(&event);
        }
    }
}

fn report(progress: Option<&ProgressHandler>, completed: u64, total: Option<u64>) {
    if let Some(progress) = progress {
        progress(Progress { completed, total });
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

async fn write_to_file(
    body: ResponseBody,
    path: &Path,
    options: DownloadOptions,
    total: Option<u64>,
    progress: Option<&ProgressHandler>,
) -> Result<(), HttpError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent
        && options.create_intermediate_directories
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    if !options.remove_previous_file && tokio::fs::try_exists(path).await? {
        return Err(HttpError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        )));
    }

    let file_name = path
        .file_name()
        .map_or_else(|| "download".into(), |n| n.to_string_lossy());
    let temp_name = format!(".{file_name}.{}.part", uuid::Uuid::new_v4().simple());
    let temp = parent.map_or_else(|| PathBuf::from(&temp_name), |p| p.join(&temp_name));

    let written = stream_body(body, &temp, total, progress).await;
    let moved = match written {
        Ok(()) => tokio::fs::rename(&temp, path).await.map_err(HttpError::Io),
        Err(err) => Err(err),
    };
    if moved.is_err()
        && let Err(cleanup) = tokio::fs::remove_file(&temp).await
        && cleanup.kind() != std::io::ErrorKind::NotFound
    {
        tracing::debug!(error = %cleanup, path = %temp.display(), "failed to remove partial download");
    }
    moved
}

async fn stream_body(
    body: ResponseBody,
    temp: &Path,
    total: Option<u64>,
    progress: Option<&ProgressHandler>,
) -> Result<(), HttpError> {
    let mut file = tokio::fs::File::create(temp).await?;
    let mut body = std::pin::pin!(body);
    let mut completed = 0u64;
    report(progress, 0, total);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            file.write_all(chunk).await?;
            completed += chunk.len() as u64;
            report(progress, completed, total);
        }
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// Map tower errors to `HttpError` with the per-attempt timeout.
///
/// Typed `HttpError`s boxed by middleware are recovered before falling back
/// to `Transport`.
#[must_use]
pub fn map_tower_error(err: BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Map buffer errors to `HttpError`.
///
/// Anything that is not the inner service's own error means the buffer
/// worker is gone.
#[must_use]
pub fn map_buffer_error(err: BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; service unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::monitor::EventMonitor;
    use http::StatusCode;
    use http_body_util::Full;
    use parking_lot::Mutex;
    use std::task::{Context, Poll};
    use tower::util::BoxCloneService;

    fn make_response_body(data: &'static [u8]) -> ResponseBody {
        Full::new(Bytes::from_static(data))
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            .boxed()
    }

    /// Answers every request with a fixed status, headers and body.
    #[derive(Clone)]
    struct FixedService {
        status: StatusCode,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static [u8],
    }

    impl Service<Request<Bytes>> for FixedService {
        type Response = Response<ResponseBody>;
        type Error = HttpError;
        type Future = ServiceFuture;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Bytes>) -> Self::Future {
            let mut builder = Response::builder().status(self.status);
            for (name, value) in &self.headers {
                builder = builder.header(*name, *value);
            }
            let response = builder.body(make_response_body(self.body)).unwrap();
            Box::pin(async move { Ok(response) })
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(TaskKind, Option<u16>, bool)>>,
    }

    impl EventMonitor for Recorder {
        fn request_did_finish(&self, event: &RequestEvent<'_>) {
            self.events.lock().push((
                event.kind,
                event.response.map(|r| r.status().as_u16()),
                event.error.is_some(),
            ));
        }
    }

    fn session(service: FixedService, recorder: Arc<Recorder>) -> Session {
        let boxed = BoxCloneService::new(service);
        Session::new(
            Buffer::new(boxed, 16),
            1024,
            TransportSecurity::AllowInsecureHttp,
            vec![recorder],
        )
    }

    fn ok(body: &'static [u8]) -> FixedService {
        FixedService {
            status: StatusCode::OK,
            headers: vec![],
            body,
        }
    }

    fn get(uri: &str) -> WireRequest {
        let mut request = WireRequest::new(Bytes::new());
        *request.uri_mut() = uri.parse().unwrap();
        request
    }

    #[tokio::test]
    async fn test_data_success_and_monitor_event() {
        let recorder = Arc::new(Recorder::default());
        let session = session(ok(b"hello"), Arc::clone(&recorder));

        let data = session
            .data(get("http://mock.test/x"), ValidationType::SuccessCodes)
            .await;
        assert_eq!(data.result.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(data.response.unwrap().status(), StatusCode::OK);
        assert_eq!(
            recorder.events.lock().as_slice(),
            &[(TaskKind::Request, Some(200), false)]
        );
    }

    #[tokio::test]
    async fn test_data_validation_failure_keeps_body() {
        let recorder = Arc::new(Recorder::default());
        let service = FixedService {
            status: StatusCode::NOT_FOUND,
            headers: vec![],
            body: b"nope",
        };
        let session = session(service, recorder);

        let data = session
            .data(get("http://mock.test/x"), ValidationType::SuccessCodes)
            .await;
        assert!(matches!(
            data.result,
            Err(HttpError::Validation {
                status: StatusCode::NOT_FOUND
            })
        ));
        assert_eq!(data.response.unwrap().body().as_ref(), b"nope");
    }

    static OVERSIZED: [u8; 9000] = [b'x'; 9000];

    #[tokio::test]
    async fn test_data_rejected_status_with_oversized_body_reports_validation() {
        let service = FixedService {
            status: StatusCode::FORBIDDEN,
            headers: vec![],
            body: &OVERSIZED,
        };
        let session = session(service, Arc::new(Recorder::default()));

        let data = session
            .data(get("http://mock.test/x"), ValidationType::SuccessCodes)
            .await;
        assert!(matches!(
            data.result,
            Err(HttpError::Validation {
                status: StatusCode::FORBIDDEN
            })
        ));
        assert_eq!(data.response.unwrap().body().len(), 1024);
    }

    #[tokio::test]
    async fn test_data_accepted_oversized_body_is_too_large() {
        let session = session(ok(&OVERSIZED), Arc::new(Recorder::default()));
        let data = session
            .data(get("http://mock.test/x"), ValidationType::SuccessCodes)
            .await;
        assert!(matches!(
            data.result,
            Err(HttpError::BodyTooLarge { limit: 1024, .. })
        ));
    }

    #[tokio::test]
    async fn test_tls_only_rejects_plain_http() {
        let boxed = BoxCloneService::new(ok(b""));
        let session = Session::new(Buffer::new(boxed, 4), 1024, TransportSecurity::TlsOnly, vec![]);
        let data = session
            .data(get("http://mock.test/x"), ValidationType::None)
            .await;
        assert!(matches!(data.result, Err(HttpError::InvalidScheme { .. })));
        assert!(data.response.is_none());
    }

    #[tokio::test]
    async fn test_download_writes_file_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let service = FixedService {
            status: StatusCode::OK,
            headers: vec![
                ("content-length", "7"),
                ("content-disposition", "attachment; filename=\"a.txt\""),
            ],
            body: b"payload",
        };
        let session = session(service, Arc::clone(&recorder));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressHandler = Arc::new(move |p| sink.lock().push(p));

        let download = session
            .download(
                get("http://mock.test/file"),
                ValidationType::SuccessCodes,
                DownloadDestination::suggested(dir.path().join("nested")),
                Some(progress),
            )
            .await;
        let path = download.result.unwrap();
        assert_eq!(path, dir.path().join("nested").join("a.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        assert_eq!(
            seen.lock().last().copied(),
            Some(Progress {
                completed: 7,
                total: Some(7)
            })
        );
        let leftovers = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(leftovers, 1);
        assert_eq!(
            recorder.events.lock().as_slice(),
            &[(TaskKind::Download, Some(200), false)]
        );
    }

    #[tokio::test]
    async fn test_download_rejected_status_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = FixedService {
            status: StatusCode::FORBIDDEN,
            headers: vec![],
            body: b"denied",
        };
        let session = session(service, Arc::new(Recorder::default()));
        let target = dir.path().join("out.bin");

        let download = session
            .download(
                get("http://mock.test/file"),
                ValidationType::SuccessCodes,
                DownloadDestination::exact(&target),
                None,
            )
            .await;
        assert!(matches!(download.result, Err(HttpError::Validation { .. })));
        assert_eq!(download.response.unwrap().body().as_ref(), b"denied");
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_download_rejected_status_keeps_truncated_preview() {
        let dir = tempfile::tempdir().unwrap();
        let service = FixedService {
            status: StatusCode::FORBIDDEN,
            headers: vec![],
            body: &OVERSIZED,
        };
        let session = session(service, Arc::new(Recorder::default()));

        let download = session
            .download(
                get("http://mock.test/file"),
                ValidationType::SuccessCodes,
                DownloadDestination::exact(dir.path().join("out.bin")),
                None,
            )
            .await;
        assert!(matches!(download.result, Err(HttpError::Validation { .. })));
        let snapshot = download.response.unwrap();
        assert_eq!(snapshot.body().len(), ERROR_BODY_PREVIEW_LIMIT);
        assert!(snapshot.body().iter().all(|b| *b == b'x'));
    }

    #[tokio::test]
    async fn test_download_respects_existing_file_when_not_replacing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("keep.txt");
        std::fs::write(&target, b"original").unwrap();
        let session = session(ok(b"new"), Arc::new(Recorder::default()));

        let destination = DownloadDestination::exact(&target).with_options(DownloadOptions {
            create_intermediate_directories: true,
            remove_previous_file: false,
        });
        let download = session
            .download(get("http://mock.test/f"), ValidationType::None, destination, None)
            .await;
        assert!(matches!(download.result, Err(HttpError::Io(_))));
        assert_eq!(std::fs::read(&target).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_upload_sets_multipart_body_and_progress() {
        let recorder = Arc::new(Recorder::default());
        let session = session(ok(b"{}"), Arc::clone(&recorder));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressHandler = Arc::new(move |p| sink.lock().push(p));

        let form = MultipartFormData::new().text("k", "v");
        let data = session
            .upload(get("http://mock.test/up"), ValidationType::SuccessCodes, form, Some(progress))
            .await;
        assert!(data.result.is_ok());
        let content_type = data.request.headers[CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let body = String::from_utf8_lossy(&data.request.body);
        assert!(body.contains("name=\"k\""));
        let expected_len = data.request.body.len() as u64;
        assert_eq!(
            seen.lock().as_slice(),
            &[
                Progress {
                    completed: 0,
                    total: Some(expected_len)
                },
                Progress {
                    completed: expected_len,
                    total: Some(expected_len)
                },
            ]
        );
        assert_eq!(
            recorder.events.lock().as_slice(),
            &[(TaskKind::Upload, Some(200), false)]
        );
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails_before_sending() {
        let recorder = Arc::new(Recorder::default());
        let session = session(ok(b""), Arc::clone(&recorder));
        let form = MultipartFormData::new().file("f", "/no/such/file.bin");

        let data = session
            .upload(get("http://mock.test/up"), ValidationType::SuccessCodes, form, None)
            .await;
        assert!(matches!(data.result, Err(HttpError::Io(_))));
        assert_eq!(
            recorder.events.lock().as_slice(),
            &[(TaskKind::Upload, None, true)]
        );
    }

    #[test]
    fn test_progress_fraction() {
        let half = Progress {
            completed: 5,
            total: Some(10),
        };
        assert!((half.fraction().unwrap() - 0.5).abs() < f64::EPSILON);
        assert!(
            Progress {
                completed: 3,
                total: None
            }
            .fraction()
            .is_none()
        );
    }

    #[test]
    fn test_map_tower_error_recovers_typed_errors() {
        let elapsed: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert!(matches!(
            map_tower_error(elapsed, Duration::from_secs(3)),
            HttpError::Timeout(d) if d == Duration::from_secs(3)
        ));
        let typed: BoxError = Box::new(HttpError::ServiceClosed);
        assert!(matches!(
            map_tower_error(typed, Duration::ZERO),
            HttpError::ServiceClosed
        ));
        let other: BoxError = "boom".into();
        assert!(matches!(
            map_buffer_error(other),
            HttpError::ServiceClosed
        ));
    }
}
