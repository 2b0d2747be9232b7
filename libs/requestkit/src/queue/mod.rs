//! Bounded-concurrency operation queues.
//!
//! A [`QueueManager`] admits submitted operations in FIFO order while fewer
//! than `max_concurrency` are running, and hands each caller a
//! [`Cancellable`]. Every submission gets exactly one completion callback:
//! [`Outcome::Completed`] with the executor's output, or
//! [`Outcome::Cancelled`].

mod executor;
mod operation;

pub use executor::{
    DataCall, DownloadCall, DownloadExecutor, DownloadManager, RequestExecutor, RequestManager,
    UploadCall, UploadExecutor, UploadManager,
};
pub use operation::{
    Cancellable, OperationId, OperationRegistry, OperationState, Outcome, StateCell,
};

use crate::config::{QualityOfService, QueueConfig};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Runs the work behind one kind of queue.
pub trait Executor: Send + Sync + 'static {
    type Call: Send + 'static;
    type Output: Send + 'static;

    /// Queue name used in logs
    const NAME: &'static str;

    fn execute(&self, call: Self::Call) -> BoxFuture<'static, Self::Output>;
}

type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

struct PendingWork<E: Executor> {
    call: E::Call,
    on_complete: Callback<E::Output>,
}

struct Entry<E: Executor> {
    state: Arc<StateCell>,
    token: CancellationToken,
    /// `Some` until the operation is admitted
    pending: Option<PendingWork<E>>,
}

struct QueueState<E: Executor> {
    operations: HashMap<OperationId, Entry<E>>,
    pending: VecDeque<OperationId>,
    running: usize,
}

struct Shared<E: Executor> {
    executor: E,
    state: Mutex<QueueState<E>>,
    max_concurrency: AtomicUsize,
    suspended: AtomicBool,
    qos: AtomicU8,
    runtime: Handle,
}

/// Owns the operations of one queue: the pending FIFO and the running set.
pub struct QueueManager<E: Executor> {
    shared: Arc<Shared<E>>,
}

impl<E: Executor> Clone for QueueManager<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Executor> std::fmt::Debug for QueueManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("name", &E::NAME)
            .field("max_concurrency", &self.max_concurrency())
            .field("running", &self.running_count())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl<E: Executor> QueueManager<E> {
    /// Operations are spawned on `runtime`.
    #[must_use]
    pub fn new(executor: E, config: QueueConfig, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                executor,
                state: Mutex::new(QueueState {
                    operations: HashMap::new(),
                    pending: VecDeque::new(),
                    running: 0,
                }),
                max_concurrency: AtomicUsize::new(config.max_concurrency.max(1)),
                suspended: AtomicBool::new(false),
                qos: AtomicU8::new(config.quality_of_service as u8),
                runtime,
            }),
        }
    }

    /// Enqueue `call`; `on_complete` runs exactly once with its outcome.
    #[must_use = "the handle is the only way to cancel the operation"]
    pub fn submit<F>(&self, call: E::Call, on_complete: F) -> Cancellable
    where
        F: FnOnce(Outcome<E::Output>) + Send + 'static,
    {
        let id = OperationId::new();
        let state = Arc::new(StateCell::new(OperationState::Queued));
        {
            let mut queue = self.shared.state.lock();
            queue.operations.insert(
                id,
                Entry {
                    state: Arc::clone(&state),
                    token: CancellationToken::new(),
                    pending: Some(PendingWork {
                        call,
                        on_complete: Box::new(on_complete),
                    }),
                },
            );
            queue.pending.push_back(id);
        }
        tracing::trace!(queue = E::NAME, operation = %id, "operation queued");
        Shared::schedule(&self.shared);

        let weak: std::sync::Weak<Shared<E>> = Arc::downgrade(&self.shared);
        Cancellable::new(id, state, weak)
    }

    /// Cancel one operation by id; unknown or finished ids are ignored.
    pub fn cancel(&self, id: OperationId) {
        self.shared.cancel_one(id);
    }

    /// Cancel every queued and running operation.
    pub fn cancel_all(&self) {
        let callbacks = {
            let mut guard = self.shared.state.lock();
            let queue = &mut *guard;
            queue.pending.clear();
            let mut callbacks = Vec::new();
            // Running tasks deliver their own callback; their slot guard
            // tolerates the entry being gone.
            for entry in std::mem::take(&mut queue.operations).into_values() {
                if let Some(work) = entry.pending {
                    entry.state.set(OperationState::Cancelled);
                    callbacks.push(work.on_complete);
                } else if entry
                    .state
                    .transition(OperationState::Running, OperationState::Cancelled)
                {
                    entry.token.cancel();
                }
            }
            callbacks
        };
        tracing::debug!(queue = E::NAME, cancelled_queued = callbacks.len(), "cancelled all operations");
        for callback in callbacks {
            callback(Outcome::Cancelled);
        }
    }

    /// Stop admitting new operations; running ones continue.
    pub fn suspend(&self) {
        self.shared.suspended.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.shared.suspended.store(false, Ordering::Release);
        Shared::schedule(&self.shared);
    }

    /// Values below 1 are treated as 1. Raising the limit admits queued work
    /// immediately; lowering it never preempts running operations.
    pub fn set_max_concurrency(&self, max: usize) {
        self.shared.max_concurrency.store(max.max(1), Ordering::Release);
        Shared::schedule(&self.shared);
    }

    pub fn set_quality_of_service(&self, qos: QualityOfService) {
        self.shared.qos.store(qos as u8, Ordering::Release);
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.shared.max_concurrency.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn quality_of_service(&self) -> QualityOfService {
        self.shared.quality_of_service()
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::Acquire)
    }

    /// Queued plus running operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.shared.state.lock().operations.len()
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.shared.state.lock().running
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    #[must_use]
    pub fn contains(&self, id: OperationId) -> bool {
        self.shared.state.lock().operations.contains_key(&id)
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.shared.executor
    }
}

impl<E: Executor> Shared<E> {
    fn quality_of_service(&self) -> QualityOfService {
        QualityOfService::from_repr(self.qos.load(Ordering::Acquire))
    }

    /// Admit pending operations while slots are free.
    fn schedule(shared: &Arc<Self>) {
        loop {
            let admitted = {
                let mut guard = shared.state.lock();
                let queue = &mut *guard;
                if shared.suspended.load(Ordering::Acquire)
                    || queue.running >= shared.max_concurrency.load(Ordering::Acquire)
                {
                    return;
                }
                let Some(id) = queue.pending.pop_front() else {
                    return;
                };
                let Some(entry) = queue.operations.get_mut(&id) else {
                    continue;
                };
                let Some(work) = entry.pending.take() else {
                    continue;
                };
                entry.state.set(OperationState::Running);
                queue.running += 1;
                (id, Arc::clone(&entry.state), entry.token.clone(), work)
            };
            Self::start(shared, admitted);
        }
    }

    fn start(
        shared: &Arc<Self>,
        (id, state, token, work): (OperationId, Arc<StateCell>, CancellationToken, PendingWork<E>),
    ) {
        let span = tracing::debug_span!(
            "queue_operation",
            queue = E::NAME,
            operation = %id,
            qos = shared.quality_of_service().as_str()
        );
        let slot = SlotGuard {
            shared: Arc::clone(shared),
            id,
        };
        let future = shared.executor.execute(work.call);
        let on_complete = work.on_complete;

        shared.runtime.spawn(
            async move {
                let output = tokio::select! {
                    biased;
                    () = token.cancelled() => None,
                    output = future => Some(output),
                };
                let outcome = match output {
                    Some(output)
                        if state.transition(OperationState::Running, OperationState::Finishing) =>
                    {
                        Outcome::Completed(output)
                    }
                    _ => Outcome::Cancelled,
                };
                drop(slot);
                if !outcome.is_cancelled() {
                    state.set(OperationState::Completed);
                }
                tracing::trace!(cancelled = outcome.is_cancelled(), "operation finished");
                on_complete(outcome);
            }
            .instrument(span),
        );
    }

    fn cancel_one(&self, id: OperationId) {
        let callback = {
            let mut guard = self.state.lock();
            let queue = &mut *guard;
            let Some(entry) = queue.operations.get(&id) else {
                return;
            };
            if entry.pending.is_some() {
                queue.pending.retain(|queued| *queued != id);
                queue
                    .operations
                    .remove(&id)
                    .and_then(|entry| {
                        entry.state.set(OperationState::Cancelled);
                        entry.pending
                    })
                    .map(|work| work.on_complete)
            } else {
                if entry
                    .state
                    .transition(OperationState::Running, OperationState::Cancelled)
                {
                    entry.token.cancel();
                    queue.operations.remove(&id);
                }
                None
            }
        };
        if let Some(callback) = callback {
            tracing::debug!(queue = E::NAME, operation = %id, "cancelled queued operation");
            callback(Outcome::Cancelled);
        }
    }
}

impl<E: Executor> OperationRegistry for Shared<E> {
    fn cancel(&self, id: OperationId) {
        self.cancel_one(id);
    }
}

/// Frees the running slot when the operation task ends, even on panic.
struct SlotGuard<E: Executor> {
    shared: Arc<Shared<E>>,
    id: OperationId,
}

impl<E: Executor> Drop for SlotGuard<E> {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.state.lock();
            queue.running = queue.running.saturating_sub(1);
            queue.operations.remove(&self.id);
        }
        Shared::schedule(&self.shared);
    }
}
