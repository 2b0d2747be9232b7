//! The public entry point: encodes descriptors, routes them to the matching
//! queue and delivers exactly one result per call.

use crate::builder::NetworkBuilder;
use crate::decoder::decode;
use crate::error::{EncodingError, HttpError, NetworkError};
use crate::multipart::MultipartFormData;
use crate::queue::{
    Cancellable, DataCall, DownloadCall, DownloadManager, Outcome, RequestManager, UploadCall,
    UploadManager,
};
use crate::requestable::{Requestable, ValidationType, WireRequest, encode_request};
use crate::response::ResponseSnapshot;
use crate::session::{DataResponse, DownloadResponse, ProgressHandler, Session};
use crate::task::{DownloadDestination, Task, TaskKind};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

/// Central sink for every error delivered by the facade.
///
/// Runs on the completing task before the caller's completion. A panic
/// inside `report` is caught and logged; delivery proceeds regardless.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &NetworkError);
}

/// Untyped result of [`Network::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Response body of a request or upload
    Data(Bytes),
    /// Location of a finished download
    File(PathBuf),
}

pub type DataResult = Result<(Bytes, Option<ResponseSnapshot>), NetworkError>;

/// Dispatches request descriptors to the request, download and upload queues.
///
/// Cheap to clone; clones share the session and the three managers.
#[derive(Clone)]
pub struct Network {
    session: Session,
    reporter: Option<Arc<dyn ErrorReporter>>,
    request_manager: RequestManager,
    download_manager: DownloadManager,
    upload_manager: UploadManager,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("session", &self.session)
            .field("reporter", &self.reporter.is_some())
            .field("request_manager", &self.request_manager)
            .field("download_manager", &self.download_manager)
            .field("upload_manager", &self.upload_manager)
            .finish()
    }
}

impl Network {
    #[must_use]
    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::new()
    }

    /// Network with the default configuration.
    ///
    /// # Errors
    /// See [`NetworkBuilder::build`].
    pub fn new() -> Result<Self, HttpError> {
        NetworkBuilder::new().build()
    }

    /// Assemble a network from explicitly constructed parts.
    #[must_use]
    pub fn from_parts(
        session: Session,
        request_manager: RequestManager,
        download_manager: DownloadManager,
        upload_manager: UploadManager,
        reporter: Option<Arc<dyn ErrorReporter>>,
    ) -> Self {
        Self {
            session,
            reporter,
            request_manager,
            download_manager,
            upload_manager,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn request_manager(&self) -> &RequestManager {
        &self.request_manager
    }

    #[must_use]
    pub fn download_manager(&self) -> &DownloadManager {
        &self.download_manager
    }

    #[must_use]
    pub fn upload_manager(&self) -> &UploadManager {
        &self.upload_manager
    }

    // Wire-level entry points

    /// Queue an already encoded data request.
    #[must_use = "the handle is the only way to cancel the operation"]
    pub fn request_wire<F>(
        &self,
        request: WireRequest,
        validation: ValidationType,
        completion: F,
    ) -> Cancellable
    where
        F: FnOnce(Result<Bytes, NetworkError>) + Send + 'static,
    {
        self.submit_data(request, validation, move |result| {
            completion(result.map(|(body, _)| body));
        })
    }

    /// Queue an already encoded download.
    #[must_use = "the handle is the only way to cancel the operation"]
    pub fn download_wire<F>(
        &self,
        request: WireRequest,
        validation: ValidationType,
        destination: DownloadDestination,
        progress: Option<ProgressHandler>,
        completion: F,
    ) -> Cancellable
    where
        F: FnOnce(Result<PathBuf, NetworkError>) + Send + 'static,
    {
        let reporter = self.reporter.clone();
        let call = DownloadCall {
            request,
            validation,
            destination,
            progress,
        };
        self.download_manager.submit(call, move |outcome| {
            completion(settle_download(outcome, reporter.as_deref()));
        })
    }

    /// Queue an already encoded request with `form` as its multipart body.
    #[must_use = "the handle is the only way to cancel the operation"]
    pub fn upload_wire<F>(
        &self,
        request: WireRequest,
        validation: ValidationType,
        form: MultipartFormData,
        progress: Option<ProgressHandler>,
        completion: F,
    ) -> Cancellable
    where
        F: FnOnce(Result<Bytes, NetworkError>) + Send + 'static,
    {
        self.submit_upload(request, validation, form, progress, move |result| {
            completion(result.map(|(body, _)| body));
        })
    }

    // Descriptor entry points

    /// Encode the descriptor and route it by task kind.
    ///
    /// Downloads complete with [`Payload::File`], everything else with
    /// [`Payload::Data`]. `progress` applies to uploads and downloads.
    ///
    /// # Errors
    /// Returns the encoding failure; nothing is queued in that case.
    pub fn send<R, F>(
        &self,
        requestable: &R,
        progress: Option<ProgressHandler>,
        completion: F,
    ) -> Result<Cancellable, EncodingError>
    where
        R: Requestable + ?Sized,
        F: FnOnce(Result<Payload, NetworkError>) + Send + 'static,
    {
        let task = requestable.task();
        let request = encode_request(requestable, &task)?;
        let validation = requestable.validation();

        let handle = match task {
            Task::DownloadDestination(destination) | Task::DownloadParameters { destination, .. } => {
                self.download_wire(request, validation, destination, progress, move |result| {
                    completion(result.map(Payload::File));
                })
            }
            Task::UploadMultipart(form) | Task::UploadCompositeMultipart { form, .. } => {
                self.upload_wire(request, validation, form, progress, move |result| {
                    completion(result.map(Payload::Data));
                })
            }
            Task::RequestPlain
            | Task::RequestJsonEncodable(_)
            | Task::RequestCustomJsonEncodable { .. }
            | Task::RequestParameters { .. }
            | Task::RequestCompositeParameters { .. } => {
                self.request_wire(request, validation, move |result| {
                    completion(result.map(Payload::Data));
                })
            }
        };
        Ok(handle)
    }

    /// Send a request or upload descriptor and deliver the raw body.
    ///
    /// # Errors
    /// Returns the encoding failure, or `EncodingError::TaskKindMismatch` for
    /// a download task.
    pub fn request<R, F>(&self, requestable: &R, completion: F) -> Result<Cancellable, EncodingError>
    where
        R: Requestable + ?Sized,
        F: FnOnce(Result<Bytes, NetworkError>) + Send + 'static,
    {
        self.dispatch_data("request", requestable, None, move |result| {
            completion(result.map(|(body, _)| body));
        })
    }

    /// Like [`Network::request`], reporting upload progress.
    ///
    /// # Errors
    /// Same as [`Network::request`].
    pub fn upload<R, F>(
        &self,
        requestable: &R,
        progress: Option<ProgressHandler>,
        completion: F,
    ) -> Result<Cancellable, EncodingError>
    where
        R: Requestable + ?Sized,
        F: FnOnce(Result<Bytes, NetworkError>) + Send + 'static,
    {
        self.dispatch_data("upload", requestable, progress, move |result| {
            completion(result.map(|(body, _)| body));
        })
    }

    /// Send a download descriptor and deliver the file location.
    ///
    /// # Errors
    /// Returns the encoding failure, or `EncodingError::TaskKindMismatch` for
    /// a non-download task.
    pub fn download<R, F>(
        &self,
        requestable: &R,
        progress: Option<ProgressHandler>,
        completion: F,
    ) -> Result<Cancellable, EncodingError>
    where
        R: Requestable + ?Sized,
        F: FnOnce(Result<PathBuf, NetworkError>) + Send + 'static,
    {
        let task = requestable.task();
        let destination = match &task {
            Task::DownloadDestination(destination) | Task::DownloadParameters { destination, .. } => {
                destination.clone()
            }
            other => {
                return Err(EncodingError::TaskKindMismatch {
                    operation: "download",
                    kind: other.kind(),
                });
            }
        };
        let request = encode_request(requestable, &task)?;
        Ok(self.download_wire(
            request,
            requestable.validation(),
            destination,
            progress,
            completion,
        ))
    }

    /// Send a request or upload descriptor and decode the body as `R::Response`,
    /// from the descriptor's key path when it has one.
    ///
    /// # Errors
    /// Same as [`Network::request`].
    pub fn request_decodable<R, F>(
        &self,
        requestable: &R,
        completion: F,
    ) -> Result<Cancellable, EncodingError>
    where
        R: Requestable + ?Sized,
        R::Response: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<R::Response, NetworkError>) + Send + 'static,
    {
        self.dispatch_decodable("request", requestable, None, completion)
    }

    /// Like [`Network::request_decodable`], reporting upload progress.
    ///
    /// # Errors
    /// Same as [`Network::request`].
    pub fn upload_decodable<R, F>(
        &self,
        requestable: &R,
        progress: Option<ProgressHandler>,
        completion: F,
    ) -> Result<Cancellable, EncodingError>
    where
        R: Requestable + ?Sized,
        R::Response: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<R::Response, NetworkError>) + Send + 'static,
    {
        self.dispatch_decodable("upload", requestable, progress, completion)
    }

    fn dispatch_decodable<R, F>(
        &self,
        operation: &'static str,
        requestable: &R,
        progress: Option<ProgressHandler>,
        completion: F,
    ) -> Result<Cancellable, EncodingError>
    where
        R: Requestable + ?Sized,
        R::Response: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<R::Response, NetworkError>) + Send + 'static,
    {
        let key_path = requestable.key_path().map(str::to_owned);
        let reporter = self.reporter.clone();
        self.dispatch_data(operation, requestable, progress, move |result| {
            let decoded = result.and_then(|(body, response)| {
                decode::<R::Response>(&body, key_path.as_deref()).map_err(|source| {
                    tracing::debug!(error = %source, key_path = key_path.as_deref(), "response decoding failed");
                    let error = NetworkError::ObjectMapping { source, response };
                    report(reporter.as_deref(), &error);
                    error
                })
            });
            completion(decoded);
        })
    }

    fn dispatch_data<R, F>(
        &self,
        operation: &'static str,
        requestable: &R,
        progress: Option<ProgressHandler>,
        completion: F,
    ) -> Result<Cancellable, EncodingError>
    where
        R: Requestable + ?Sized,
        F: FnOnce(DataResult) + Send + 'static,
    {
        let task = requestable.task();
        if task.kind() == TaskKind::Download {
            return Err(EncodingError::TaskKindMismatch {
                operation,
                kind: TaskKind::Download,
            });
        }
        let request = encode_request(requestable, &task)?;
        let validation = requestable.validation();

        let handle = match task {
            Task::UploadMultipart(form) | Task::UploadCompositeMultipart { form, .. } => {
                self.submit_upload(request, validation, form, progress, completion)
            }
            _ => self.submit_data(request, validation, completion),
        };
        Ok(handle)
    }

    fn submit_data<F>(&self, request: WireRequest, validation: ValidationType, completion: F) -> Cancellable
    where
        F: FnOnce(DataResult) + Send + 'static,
    {
        let reporter = self.reporter.clone();
        self.request_manager
            .submit(DataCall { request, validation }, move |outcome| {
                completion(settle_data(outcome, reporter.as_deref()));
            })
    }

    fn submit_upload<F>(
        &self,
        request: WireRequest,
        validation: ValidationType,
        form: MultipartFormData,
        progress: Option<ProgressHandler>,
        completion: F,
    ) -> Cancellable
    where
        F: FnOnce(DataResult) + Send + 'static,
    {
        let reporter = self.reporter.clone();
        let call = UploadCall {
            request,
            validation,
            form,
            progress,
        };
        self.upload_manager.submit(call, move |outcome| {
            completion(settle_data(outcome, reporter.as_deref()));
        })
    }
}

fn settle_data(outcome: Outcome<DataResponse>, reporter: Option<&dyn ErrorReporter>) -> DataResult {
    let result = match outcome {
        Outcome::Cancelled => Err(NetworkError::underlying(HttpError::Cancelled, None)),
        Outcome::Completed(DataResponse {
            response, result, ..
        }) => match result {
            Ok(body) => Ok((body, response)),
            Err(source) => Err(NetworkError::underlying(source, response)),
        },
    };
    if let Err(error) = &result {
        report(reporter, error);
    }
    result
}

fn settle_download(
    outcome: Outcome<DownloadResponse>,
    reporter: Option<&dyn ErrorReporter>,
) -> Result<PathBuf, NetworkError> {
    let result = match outcome {
        Outcome::Cancelled => Err(NetworkError::underlying(HttpError::Cancelled, None)),
        Outcome::Completed(DownloadResponse {
            response, result, ..
        }) => result.map_err(|source| NetworkError::underlying(source, response)),
    };
    if let Err(error) = &result {
        report(reporter, error);
    }
    result
}

fn report(reporter: Option<&dyn ErrorReporter>, error: &NetworkError) {
    let Some(reporter) = reporter else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| reporter.report(error))).is_err() {
        tracing::warn!(error = %error, "error reporter panicked; delivering error anyway");
    }
}
