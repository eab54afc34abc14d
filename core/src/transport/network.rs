//! Production transport backed by a blocking `ureq` agent.
//!
//! Each started task runs its round-trip on a dedicated thread and reports
//! through the shared `TaskCell`, so callers never block. Every HTTP status
//! is a response; only I/O-level failures become `ServiceError::Transport`.
//! Redirects are followed and the response reports the final URL. Response
//! bodies are read in full with no size cap.

use std::thread;
use std::time::Duration;

use bytes::Bytes;
use ureq::http;
use ureq::{Agent, ResponseExt};

use super::{CompletionHandler, Outcome, ResumeAction, TaskCell, TaskState, Transport, TransportTask};
use crate::error::ServiceError;
use crate::http::{CachePolicy, Headers, HttpResponse, WireRequest, CACHE_CONTROL, CONTENT_LENGTH};

/// Name of the threads that carry out requests.
pub const WORKER_THREAD_NAME: &str = "service-request";

/// Performs real HTTP requests. Cheap to clone; clones share connections.
#[derive(Clone)]
pub struct NetworkTransport {
    agent: Agent,
}

impl NetworkTransport {
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// `timeout` bounds each whole round-trip. `None` waits indefinitely.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for NetworkTransport {
    fn create_task(&self, request: WireRequest, on_complete: CompletionHandler) -> Box<dyn TransportTask> {
        Box::new(NetworkTask {
            agent: self.agent.clone(),
            request,
            cell: TaskCell::new(on_complete),
        })
    }
}

struct NetworkTask {
    agent: Agent,
    request: WireRequest,
    cell: TaskCell,
}

impl TransportTask for NetworkTask {
    fn resume(&self) {
        if self.cell.resume() != ResumeAction::Start {
            return;
        }
        let agent = self.agent.clone();
        let request = self.request.clone();
        let cell = self.cell.clone();
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                tracing::debug!(method = %request.method, url = %request.url, "sending request");
                let outcome = match execute(&agent, &request) {
                    Ok((data, response)) => {
                        tracing::debug!(url = %response.url, status = response.status, bytes = data.len(), "response received");
                        Outcome {
                            data: Some(data),
                            response: Some(response),
                            error: None,
                        }
                    }
                    Err(error) => {
                        tracing::debug!(url = %request.url, %error, "request failed");
                        Outcome::failed(error)
                    }
                };
                cell.complete(outcome);
            });
        if let Err(error) = spawned {
            tracing::warn!(url = %self.request.url, %error, "could not start request thread");
            self.cell
                .complete(Outcome::failed(ServiceError::transport(format!("cannot spawn request thread: {error}"))));
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

fn execute(agent: &Agent, request: &WireRequest) -> Result<(Bytes, HttpResponse), ServiceError> {
    let mut builder = http::Request::builder()
        .method(request.method.as_str())
        .uri(request.url.as_str());
    // ureq derives Content-Length from the body itself.
    for (name, value) in request.headers.iter().filter(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_LENGTH)) {
        builder = builder.header(name, value);
    }
    if request.cache_policy == CachePolicy::ReloadIgnoringLocalCacheData && !request.headers.contains(CACHE_CONTROL) {
        builder = builder.header(CACHE_CONTROL, "no-cache");
    }

    let malformed = |error: http::Error| ServiceError::transport(format!("malformed request: {error}"));
    let mut response = match &request.body {
        Some(body) => agent.run(builder.body(body.to_vec()).map_err(malformed)?)?,
        None => agent.run(builder.body(()).map_err(malformed)?)?,
    };

    let headers: Headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
        .collect();
    let metadata = HttpResponse {
        status: response.status().as_u16(),
        url: response.get_uri().to_string(),
        headers,
    };
    let data = response.body_mut().with_config().limit(u64::MAX).read_to_vec()?;
    Ok((Bytes::from(data), metadata))
}
