//! Scripted transport for tests.
//!
//! `MockTransport` records every wire request it is given and answers with
//! whatever the responder returns. In the default mode a task completes on
//! the thread that resumes it. In deferred mode started tasks wait until
//! `complete_pending` is called, which lets tests observe the in-flight
//! states and exercise suspend and cancel.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::{CompletionHandler, Outcome, ResumeAction, TaskCell, TaskState, Transport, TransportTask};
use crate::error::ServiceError;
use crate::http::{Headers, HttpResponse, WireRequest};

type Responder = dyn Fn(&WireRequest) -> MockReply + Send + Sync;

/// What the mock answers for one request.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub data: Option<Bytes>,
    pub status: Option<u16>,
    pub error: Option<ServiceError>,
}

impl MockReply {
    pub fn body(status: u16, data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            status: Some(status),
            error: None,
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::body(status, value.to_string())
    }

    pub fn error(error: ServiceError) -> Self {
        Self {
            data: None,
            status: None,
            error: Some(error),
        }
    }

    fn into_outcome(self, request: &WireRequest) -> Outcome {
        let response = self.status.map(|status| HttpResponse {
            status,
            url: request.url.clone(),
            headers: Headers::new(),
        });
        Outcome {
            data: self.data,
            response,
            error: self.error,
        }
    }
}

#[derive(Default)]
struct MockState {
    requests: Vec<WireRequest>,
    pending: Vec<(TaskCell, WireRequest)>,
}

/// In-memory `Transport` driven by a responder closure.
#[derive(Clone)]
pub struct MockTransport {
    responder: Arc<Responder>,
    deferred: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Tasks complete as soon as they are resumed.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&WireRequest) -> MockReply + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            deferred: false,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Tasks stay in flight until `complete_pending` runs.
    pub fn deferred<F>(responder: F) -> Self
    where
        F: Fn(&WireRequest) -> MockReply + Send + Sync + 'static,
    {
        Self {
            deferred: true,
            ..Self::new(responder)
        }
    }

    /// Every request handed to `create_task`, in order.
    pub fn requests(&self) -> Vec<WireRequest> {
        self.lock().requests.clone()
    }

    /// Answer every started task that is still waiting. Returns how many
    /// were answered.
    pub fn complete_pending(&self) -> usize {
        let pending = std::mem::take(&mut self.lock().pending);
        let count = pending.len();
        for (cell, request) in pending {
            cell.complete((self.responder)(&request).into_outcome(&request));
        }
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MockTransport {
    fn create_task(&self, request: WireRequest, on_complete: CompletionHandler) -> Box<dyn TransportTask> {
        self.lock().requests.push(request.clone());
        Box::new(MockTask {
            transport: self.clone(),
            request,
            cell: TaskCell::new(on_complete),
        })
    }
}

struct MockTask {
    transport: MockTransport,
    request: WireRequest,
    cell: TaskCell,
}

impl TransportTask for MockTask {
    fn resume(&self) {
        if self.cell.resume() != ResumeAction::Start {
            return;
        }
        if self.transport.deferred {
            self.transport
                .lock()
                .pending
                .push((self.cell.clone(), self.request.clone()));
        } else {
            let reply = (self.transport.responder)(&self.request);
            self.cell.complete(reply.into_outcome(&self.request));
        }
    }

    fn suspend(&self) {
        self.cell.suspend();
    }

    fn cancel(&self) {
        self.cell.cancel();
    }

    fn state(&self) -> TaskState {
        self.cell.state()
    }
}
