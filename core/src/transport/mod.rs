//! The transport seam: the only place the core touches the network.
//!
//! # Design
//! A `Transport` turns a `WireRequest` plus a completion handler into a
//! `TransportTask` that the caller can resume, suspend or cancel. Two
//! implementations exist: `NetworkTransport` performs real HTTP through
//! `ureq`, and `MockTransport` answers from a scripted responder for tests.
//!
//! Both share `TaskCell`, which owns the lifecycle rules so every adapter
//! behaves the same way:
//! - the completion handler fires exactly once;
//! - a result that arrives while suspended is held until `resume`;
//! - `cancel` before the work starts completes with `Cancelled` at once;
//! - `cancel` while the work is in flight reports `Cancelled` when it returns;
//! - anything after completion is a no-op.

pub mod mock;
pub mod network;

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::error::ServiceError;
use crate::http::{HttpResponse, WireRequest};

pub use mock::{MockReply, MockTransport};
pub use network::NetworkTransport;

/// Invoked once with (body, response metadata, error).
pub type CompletionHandler =
    Box<dyn FnOnce(Option<Bytes>, Option<HttpResponse>, Option<ServiceError>) + Send>;

/// Lifecycle state of a transport task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Suspended,
    Running,
    Canceling,
    Completed,
}

/// Executes wire requests. Shared by many tasks at once.
pub trait Transport: Send + Sync {
    /// Create a suspended task for `request`. Nothing is sent until
    /// `resume` is called.
    fn create_task(&self, request: WireRequest, on_complete: CompletionHandler) -> Box<dyn TransportTask>;
}

/// Handle to one in-flight or not-yet-started request.
pub trait TransportTask: Send + Sync {
    fn resume(&self);
    fn suspend(&self);
    fn cancel(&self);
    fn state(&self) -> TaskState;
}

/// Raw result of a round-trip as a transport sees it.
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    pub data: Option<Bytes>,
    pub response: Option<HttpResponse>,
    pub error: Option<ServiceError>,
}

impl Outcome {
    pub(crate) fn failed(error: ServiceError) -> Self {
        Self {
            data: None,
            response: None,
            error: Some(error),
        }
    }
}

struct CellInner {
    state: TaskState,
    started: bool,
    held: Option<Outcome>,
    handler: Option<CompletionHandler>,
}

/// Shared lifecycle state for a transport task.
#[derive(Clone)]
pub(crate) struct TaskCell {
    inner: Arc<Mutex<CellInner>>,
}

/// What the adapter should do after `TaskCell::resume`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ResumeAction {
    /// First resume: start the work.
    Start,
    Nothing,
}

impl TaskCell {
    pub(crate) fn new(handler: CompletionHandler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CellInner {
                state: TaskState::Suspended,
                started: false,
                held: None,
                handler: Some(handler),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CellInner> {
        // A handler never runs under this lock, so poisoning can only come
        // from a panic in the bookkeeping itself; the state is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn state(&self) -> TaskState {
        self.lock().state
    }

    pub(crate) fn resume(&self) -> ResumeAction {
        let mut inner = self.lock();
        if inner.state != TaskState::Suspended {
            return ResumeAction::Nothing;
        }
        inner.state = TaskState::Running;
        let held = inner.held.take();
        if let Some(outcome) = held {
            Self::finish(inner, outcome);
            return ResumeAction::Nothing;
        }
        if inner.started {
            ResumeAction::Nothing
        } else {
            inner.started = true;
            ResumeAction::Start
        }
    }

    pub(crate) fn suspend(&self) {
        let mut inner = self.lock();
        if inner.state == TaskState::Running {
            inner.state = TaskState::Suspended;
        }
    }

    pub(crate) fn cancel(&self) {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            TaskState::Completed | TaskState::Canceling => {}
            _ if !inner.started || inner.held.is_some() => {
                inner.held = None;
                Self::finish(inner, Outcome::failed(ServiceError::Cancelled));
            }
            _ => inner.state = TaskState::Canceling,
        }
    }

    /// Report the result of the work. Called once by the adapter.
    pub(crate) fn complete(&self, outcome: Outcome) {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            TaskState::Completed => {}
            TaskState::Suspended => inner.held = Some(outcome),
            TaskState::Canceling => Self::finish(inner, Outcome::failed(ServiceError::Cancelled)),
            TaskState::Running => Self::finish(inner, outcome),
        }
    }

    /// Mark completed and run the handler after releasing the lock.
    fn finish(mut inner: MutexGuard<'_, CellInner>, outcome: Outcome) {
        inner.state = TaskState::Completed;
        let handler = inner.handler.take();
        drop(inner);
        if let Some(handler) = handler {
            handler(outcome.data, outcome.response, outcome.error);
        }
    }
}
