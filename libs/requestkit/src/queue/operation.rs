use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Identity of one submitted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of an operation inside a queue manager.
///
/// `Queued -> Running -> Finishing -> Completed`, or `Cancelled` from
/// `Queued`/`Running`. Once `Finishing` the result is delivered; a later
/// cancel is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationState {
    Queued = 0,
    Running = 1,
    Finishing = 2,
    Cancelled = 3,
    Completed = 4,
}

impl OperationState {
    const fn from_repr(value: u8) -> Self {
        match value {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Finishing,
            3 => Self::Cancelled,
            _ => Self::Completed,
        }
    }

    /// No further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }
}

/// Atomically updated [`OperationState`], shared by the manager and handles.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    #[must_use]
    pub fn new(state: OperationState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[must_use]
    pub fn get(&self) -> OperationState {
        OperationState::from_repr(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: OperationState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; `false` when the state was not `from`.
    pub fn transition(&self, from: OperationState, to: OperationState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// What a completion callback receives.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}

/// Anything that can cancel operations by id.
pub trait OperationRegistry: Send + Sync {
    fn cancel(&self, id: OperationId);
}

/// Handle to a submitted operation.
///
/// Holds the manager weakly: cancelling after the manager is gone is a no-op.
#[derive(Clone)]
pub struct Cancellable {
    id: OperationId,
    state: Arc<StateCell>,
    registry: Weak<dyn OperationRegistry>,
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl Cancellable {
    #[must_use]
    pub fn new(id: OperationId, state: Arc<StateCell>, registry: Weak<dyn OperationRegistry>) -> Self {
        Self {
            id,
            state,
            registry,
        }
    }

    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> OperationState {
        self.state.get()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == OperationState::Cancelled
    }

    /// Completed or cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Cancel the operation. Idempotent.
    ///
    /// A queued operation never starts; a running one has its future dropped.
    /// Either way the completion callback receives [`Outcome::Cancelled`].
    pub fn cancel(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.cancel(self.id);
        }
    }
}
