use super::{Executor, QueueManager};
use crate::multipart::MultipartFormData;
use crate::requestable::{ValidationType, WireRequest};
use crate::session::{DataResponse, DownloadResponse, ProgressHandler, Session};
use crate::task::DownloadDestination;
use futures::future::BoxFuture;

/// A data request waiting in the request queue.
#[derive(Debug)]
pub struct DataCall {
    pub request: WireRequest,
    pub validation: ValidationType,
}

pub struct DownloadCall {
    pub request: WireRequest,
    pub validation: ValidationType,
    pub destination: DownloadDestination,
    pub progress: Option<ProgressHandler>,
}

pub struct UploadCall {
    pub request: WireRequest,
    pub validation: ValidationType,
    pub form: MultipartFormData,
    pub progress: Option<ProgressHandler>,
}

/// Sends buffered data requests through the session.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    session: Session,
}

impl RequestExecutor {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl Executor for RequestExecutor {
    type Call = DataCall;
    type Output = DataResponse;
    const NAME: &'static str = "request";

    fn execute(&self, call: DataCall) -> BoxFuture<'static, DataResponse> {
        let session = self.session.clone();
        Box::pin(async move { session.data(call.request, call.validation).await })
    }
}

/// Streams responses to disk through the session.
#[derive(Debug, Clone)]
pub struct DownloadExecutor {
    session: Session,
}

impl DownloadExecutor {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl Executor for DownloadExecutor {
    type Call = DownloadCall;
    type Output = DownloadResponse;
    const NAME: &'static str = "download";

    fn execute(&self, call: DownloadCall) -> BoxFuture<'static, DownloadResponse> {
        let session = self.session.clone();
        Box::pin(async move {
            session
                .download(call.request, call.validation, call.destination, call.progress)
                .await
        })
    }
}

/// Sends multipart uploads through the session.
#[derive(Debug, Clone)]
pub struct UploadExecutor {
    session: Session,
}

impl UploadExecutor {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl Executor for UploadExecutor {
    type Call = UploadCall;
    type Output = DataResponse;
    const NAME: &'static str = "upload";

    fn execute(&self, call: UploadCall) -> BoxFuture<'static, DataResponse> {
        let session = self.session.clone();
        Box::pin(async move {
            session
                .upload(call.request, call.validation, call.form, call.progress)
                .await
        })
    }
}

pub type RequestManager = QueueManager<RequestExecutor>;
pub type DownloadManager = QueueManager<DownloadExecutor>;
pub type UploadManager = QueueManager<UploadExecutor>;
