//! `ServiceTask`: one request plus the callbacks waiting on it.
//!
//! # Design
//! Callbacks are kept in a single subscriber list; each entry pairs a
//! callback kind (raw response, JSON, error) with the queue it runs on. The
//! transport's completion handler fires once and hands the result to
//! `Dispatcher::deliver`, which routes every subscriber in registration
//! order:
//! - an error reaches error callbacks only, even if body bytes came with it;
//! - otherwise raw callbacks get (body, response) and JSON callbacks get the
//!   parsed body, or nothing at all when the body is not valid JSON.
//!
//! A callback registered after delivery is routed straight away against the
//! stored result, on its own queue. One registered while delivery is still
//! routing earlier callbacks waits its turn behind them.
//!
//! Dropping a `ServiceTask` does not cancel the request; call `cancel`.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use bytes::Bytes;
use serde_json::Value;

use crate::error::ServiceError;
use crate::http::{HttpResponse, WireRequest};
use crate::queue::QueueRef;
use crate::transport::{Outcome, TaskState, Transport, TransportTask};

enum Callback {
    Response(Box<dyn FnOnce(Option<Bytes>, Option<HttpResponse>) + Send>),
    Json(Box<dyn FnOnce(Value) + Send>),
    Error(Box<dyn FnOnce(ServiceError) + Send>),
}

struct Subscriber {
    queue: QueueRef,
    callback: Callback,
}

struct Delivery {
    outcome: Outcome,
    json: OnceLock<Option<Value>>,
}

impl Delivery {
    /// Parse the body once, on first use.
    fn json(&self) -> Option<&Value> {
        self.json
            .get_or_init(|| {
                let data = self.outcome.data.as_ref()?;
                match serde_json::from_slice(data) {
                    Ok(value) => Some(value),
                    Err(error) => {
                        tracing::debug!(%error, "response body is not JSON; skipping JSON callbacks");
                        None
                    }
                }
            })
            .as_ref()
    }
}

enum Subscribers {
    Waiting(Vec<Subscriber>),
    /// Routing is under way; late subscribers queue behind the batch.
    Delivering(Vec<Subscriber>),
    Delivered(Arc<Delivery>),
}

struct Dispatcher {
    subscribers: Mutex<Subscribers>,
}

impl Dispatcher {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::Waiting(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscribe(&self, subscriber: Subscriber) {
        let mut guard = self.lock();
        let delivery = match &mut *guard {
            Subscribers::Waiting(list) | Subscribers::Delivering(list) => {
                list.push(subscriber);
                return;
            }
            Subscribers::Delivered(delivery) => Arc::clone(delivery),
        };
        drop(guard);
        route(&delivery, subscriber);
    }

    fn deliver(&self, outcome: Outcome) {
        let delivery = Arc::new(Delivery {
            outcome,
            json: OnceLock::new(),
        });
        let mut batch = {
            let mut guard = self.lock();
            let Subscribers::Waiting(list) = &mut *guard else {
                tracing::warn!("completion delivered twice; ignoring the second result");
                return;
            };
            let batch = std::mem::take(list);
            *guard = Subscribers::Delivering(Vec::new());
            batch
        };
        tracing::debug!(
            subscribers = batch.len(),
            failed = delivery.outcome.error.is_some(),
            "dispatching completion"
        );
        // Subscribers that arrive while a batch is being routed go out in the
        // next batch.
        loop {
            for subscriber in batch {
                route(&delivery, subscriber);
            }
            let mut guard = self.lock();
            if let Subscribers::Delivering(list) = &mut *guard {
                if !list.is_empty() {
                    batch = std::mem::take(list);
                    continue;
                }
            }
            *guard = Subscribers::Delivered(Arc::clone(&delivery));
            return;
        }
    }
}

fn route(delivery: &Delivery, subscriber: Subscriber) {
    let Subscriber { queue, callback } = subscriber;
    let outcome = &delivery.outcome;
    match (&outcome.error, callback) {
        (Some(error), Callback::Error(handler)) => {
            let error = error.clone();
            queue.dispatch(Box::new(move || handler(error)));
        }
        (Some(_), _) | (None, Callback::Error(_)) => {}
        (None, Callback::Response(handler)) => {
            let data = outcome.data.clone();
            let response = outcome.response.clone();
            queue.dispatch(Box::new(move || handler(data, response)));
        }
        (None, Callback::Json(handler)) => {
            if let Some(value) = delivery.json() {
                let value = value.clone();
                queue.dispatch(Box::new(move || handler(value)));
            }
        }
    }
}

struct TaskInner {
    request: Option<WireRequest>,
    underlying: Option<Box<dyn TransportTask>>,
    dispatcher: Arc<Dispatcher>,
    default_queue: QueueRef,
}

/// A request in flight (or waiting to start) with its registered callbacks.
///
/// Cheap to clone; clones refer to the same request.
#[derive(Clone)]
pub struct ServiceTask {
    inner: Arc<TaskInner>,
}

impl ServiceTask {
    pub(crate) fn new(
        request: WireRequest,
        transport: &dyn Transport,
        default_queue: QueueRef,
        start_immediately: bool,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        let on_complete = {
            let dispatcher = Arc::clone(&dispatcher);
            Box::new(move |data, response, error| dispatcher.deliver(Outcome { data, response, error }))
        };
        let underlying = transport.create_task(request.clone(), on_complete);
        let task = Self {
            inner: Arc::new(TaskInner {
                request: Some(request),
                underlying: Some(underlying),
                dispatcher,
                default_queue,
            }),
        };
        if start_immediately {
            task.resume();
        }
        task
    }

    /// A task that never reached the transport and is already completed
    /// with `error`.
    pub(crate) fn failed(error: ServiceError, default_queue: QueueRef) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.deliver(Outcome::failed(error));
        Self {
            inner: Arc::new(TaskInner {
                request: None,
                underlying: None,
                dispatcher,
                default_queue,
            }),
        }
    }

    fn subscribe(self, queue: QueueRef, callback: Callback) -> Self {
        self.inner.dispatcher.subscribe(Subscriber { queue, callback });
        self
    }

    /// Called with the raw body and response metadata on success.
    pub fn response<F>(self, handler: F) -> Self
    where
        F: FnOnce(Option<Bytes>, Option<HttpResponse>) + Send + 'static,
    {
        let queue = Arc::clone(&self.inner.default_queue);
        self.response_on(queue, handler)
    }

    pub fn response_on<F>(self, queue: QueueRef, handler: F) -> Self
    where
        F: FnOnce(Option<Bytes>, Option<HttpResponse>) + Send + 'static,
    {
        self.subscribe(queue, Callback::Response(Box::new(handler)))
    }

    /// Called with the parsed body on success. Not called at all when the
    /// body is missing or is not valid JSON.
    pub fn response_json<F>(self, handler: F) -> Self
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let queue = Arc::clone(&self.inner.default_queue);
        self.response_json_on(queue, handler)
    }

    pub fn response_json_on<F>(self, queue: QueueRef, handler: F) -> Self
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.subscribe(queue, Callback::Json(Box::new(handler)))
    }

    /// Called when the request fails before a response arrives.
    pub fn response_error<F>(self, handler: F) -> Self
    where
        F: FnOnce(ServiceError) + Send + 'static,
    {
        let queue = Arc::clone(&self.inner.default_queue);
        self.response_error_on(queue, handler)
    }

    pub fn response_error_on<F>(self, queue: QueueRef, handler: F) -> Self
    where
        F: FnOnce(ServiceError) + Send + 'static,
    {
        self.subscribe(queue, Callback::Error(Box::new(handler)))
    }

    pub fn resume(&self) {
        if let Some(task) = &self.inner.underlying {
            task.resume();
        }
    }

    /// Best effort; a result that arrives while suspended is held until
    /// `resume`.
    pub fn suspend(&self) {
        if let Some(task) = &self.inner.underlying {
            task.suspend();
        }
    }

    /// Best effort; no-op once the transport has completed.
    pub fn cancel(&self) {
        if let Some(task) = &self.inner.underlying {
            task.cancel();
        }
    }

    pub fn state(&self) -> TaskState {
        self.inner
            .underlying
            .as_ref()
            .map_or(TaskState::Completed, |task| task.state())
    }

    /// The compiled request, or `None` if compilation failed.
    pub fn request(&self) -> Option<&WireRequest> {
        self.inner.request.as_ref()
    }
}

impl std::fmt::Debug for ServiceTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTask")
            .field("request", &self.inner.request)
            .field("state", &self.state())
            .finish()
    }
}
