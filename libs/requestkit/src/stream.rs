//! Single-value async adapters over cancellable operations.

use crate::error::{EncodingError, HttpError, NetworkError};
use crate::network::Network;
use crate::queue::Cancellable;
use crate::requestable::Requestable;
use crate::session::ProgressHandler;
use futures::Stream;
use futures::stream::FusedStream;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Delivery<T> = Result<T, NetworkError>;

/// Result of one operation, awaitable as a `Future` or consumed as a
/// `Stream` yielding exactly one item.
///
/// Dropping it before the result arrives cancels the operation.
#[must_use = "dropping the response cancels the operation"]
pub struct SingleResponse<T> {
    receiver: Option<oneshot::Receiver<Delivery<T>>>,
    handle: Option<Cancellable>,
}

impl<T> std::fmt::Debug for SingleResponse<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleResponse")
            .field("handle", &self.handle)
            .field("terminated", &self.receiver.is_none())
            .finish()
    }
}

impl<T: Send + 'static> SingleResponse<T> {
    /// Wrap a submission: `submit` receives the completion and returns the
    /// operation handle.
    ///
    /// # Errors
    /// Propagates the submission's encoding failure.
    pub fn submit<S>(submit: S) -> Result<Self, EncodingError>
    where
        S: FnOnce(Box<dyn FnOnce(Delivery<T>) + Send>) -> Result<Cancellable, EncodingError>,
    {
        let (tx, rx) = oneshot::channel();
        let handle = submit(Box::new(move |result| {
            if tx.send(result).is_err() {
                tracing::trace!("single response dropped before delivery");
            }
        }))?;
        Ok(Self {
            receiver: Some(rx),
            handle: Some(handle),
        })
    }
}

impl<T> SingleResponse<T> {
    /// Handle of the underlying operation, until the result is delivered.
    #[must_use]
    pub fn handle(&self) -> Option<&Cancellable> {
        self.handle.as_ref()
    }

    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.cancel();
        }
    }
}

impl<T> Future for SingleResponse<T> {
    type Output = Delivery<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(receiver) = this.receiver.as_mut() else {
            return Poll::Ready(Err(NetworkError::underlying(HttpError::ServiceClosed, None)));
        };
        let delivered = match Pin::new(receiver).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(delivered) => delivered,
        };
        this.receiver = None;
        this.handle = None;
        Poll::Ready(delivered.unwrap_or_else(|_| {
            // Completion dropped without running: the manager went away.
            Err(NetworkError::underlying(HttpError::ServiceClosed, None))
        }))
    }
}

impl<T> Stream for SingleResponse<T> {
    type Item = Delivery<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.receiver.is_none() {
            return Poll::Ready(None);
        }
        self.poll(cx).map(Some)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::from(self.receiver.is_some());
        (remaining, Some(remaining))
    }
}

impl<T> FusedStream for SingleResponse<T> {
    fn is_terminated(&self) -> bool {
        self.receiver.is_none()
    }
}

impl<T> Drop for SingleResponse<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl Network {
    /// [`Network::request_decodable`] as a single-value stream.
    ///
    /// # Errors
    /// Same as [`Network::request`].
    pub fn request_stream<R>(&self, requestable: &R) -> Result<SingleResponse<R::Response>, EncodingError>
    where
        R: Requestable + ?Sized,
        R::Response: DeserializeOwned + Send + 'static,
    {
        SingleResponse::submit(|completion| self.request_decodable(requestable, completion))
    }

    /// [`Network::upload_decodable`] as a single-value stream.
    ///
    /// # Errors
    /// Same as [`Network::request`].
    pub fn upload_stream<R>(
        &self,
        requestable: &R,
        progress: Option<ProgressHandler>,
    ) -> Result<SingleResponse<R::Response>, EncodingError>
    where
        R: Requestable + ?Sized,
        R::Response: DeserializeOwned + Send + 'static,
    {
        SingleResponse::submit(|completion| self.upload_decodable(requestable, progress, completion))
    }

    /// [`Network::download`] as a single-value stream.
    ///
    /// # Errors
    /// Same as [`Network::download`].
    pub fn download_stream<R>(
        &self,
        requestable: &R,
        progress: Option<ProgressHandler>,
    ) -> Result<SingleResponse<PathBuf>, EncodingError>
    where
        R: Requestable + ?Sized,
    {
        SingleResponse::submit(|completion| self.download(requestable, progress, completion))
    }
}
