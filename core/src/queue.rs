//! Execution queues for response callbacks.
//!
//! # Design
//! A callback is registered together with the queue it should run on. When
//! a task completes, each callback is handed to its queue as a `Job`. Queues
//! run jobs in the order they were dispatched; there is no ordering between
//! different queues.
//!
//! - `InlineQueue` runs the job on the thread that delivers the completion.
//! - `SerialQueue` owns one worker thread fed through a channel.
//! - `ManualQueue` holds jobs until its owner calls `run_pending`, the
//!   equivalent of a UI thread draining its run loop.

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// A unit of callback work.
pub type Job = Box<dyn FnOnce() + Send>;

/// Somewhere callbacks can run.
pub trait CallbackQueue: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Shared handle to a queue.
pub type QueueRef = Arc<dyn CallbackQueue>;

/// Runs jobs immediately on the dispatching thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineQueue;

impl InlineQueue {
    pub fn shared() -> QueueRef {
        Arc::new(InlineQueue)
    }
}

impl CallbackQueue for InlineQueue {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Runs jobs one at a time, in order, on a dedicated named thread.
///
/// The worker exits once the queue is dropped and the backlog is drained.
pub struct SerialQueue {
    sender: Sender<Job>,
    label: String,
}

impl SerialQueue {
    pub fn new(label: impl Into<String>) -> std::io::Result<Self> {
        let label = label.into();
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = unbounded();
        thread::Builder::new().name(label.clone()).spawn(move || {
            for job in receiver {
                job();
            }
        })?;
        Ok(Self { sender, label })
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl CallbackQueue for SerialQueue {
    fn dispatch(&self, job: Job) {
        if self.sender.send(job).is_err() {
            tracing::warn!(queue = %self.label, "serial queue worker is gone; dropping callback");
        }
    }
}

/// Collects jobs until the owner drains them with `run_pending`.
#[derive(Clone, Default)]
pub struct ManualQueue {
    jobs: Arc<Mutex<Vec<Job>>>,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run everything queued so far, in dispatch order. Jobs dispatched while
    /// draining run on the next call. Returns how many jobs ran.
    pub fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.jobs.lock().unwrap_or_else(|p| p.into_inner()));
        let count = jobs.len();
        for job in jobs {
            job();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CallbackQueue for ManualQueue {
    fn dispatch(&self, job: Job) {
        self.jobs.lock().unwrap_or_else(|p| p.into_inner()).push(job);
    }
}
