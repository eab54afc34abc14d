//! Entry point: turns verb calls into started (or suspended) `ServiceTask`s.
//!
//! # Design
//! `ServiceFacade` holds a base URL, a shared transport, the default
//! completion queue and the auto-start policy. It keeps no per-request
//! state, so one facade can serve many concurrent tasks and several facades
//! with different base URLs and transports can coexist.
//!
//! Verb methods never fail. A request that cannot be compiled still yields a
//! task; it is already completed and reports the problem to its error
//! callbacks.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::encoding::Parameters;
use crate::error::ServiceError;
use crate::http::{Headers, HttpMethod, ACCEPT, USER_AGENT};
use crate::queue::{InlineQueue, QueueRef};
use crate::request::{resolve_url, RequestDescriptor, RequestOption};
use crate::task::ServiceTask;
use crate::transport::{NetworkTransport, Transport};

const DEFAULT_USER_AGENT: &str = concat!("service-core/", env!("CARGO_PKG_VERSION"));

/// Declarative HTTP client bound to one base URL.
#[derive(Clone)]
pub struct ServiceFacade {
    base_url: String,
    start_tasks_immediately: bool,
    transport: Arc<dyn Transport>,
    completion_queue: QueueRef,
    default_headers: Headers,
}

impl ServiceFacade {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let default_headers = [(USER_AGENT, DEFAULT_USER_AGENT), (ACCEPT, "*/*")]
            .into_iter()
            .collect();
        Self {
            base_url: base_url.into(),
            start_tasks_immediately: true,
            transport,
            completion_queue: InlineQueue::shared(),
            default_headers,
        }
    }

    /// A facade backed by the production `NetworkTransport`.
    pub fn with_network(base_url: impl Into<String>) -> Self {
        Self::new(base_url, Arc::new(NetworkTransport::new()))
    }

    pub fn from_config(config: &ServiceConfig, transport: Arc<dyn Transport>) -> Self {
        let mut facade = Self::new(config.base_url.clone(), transport)
            .with_start_tasks_immediately(config.start_tasks_immediately);
        for (name, value) in &config.default_headers {
            facade.default_headers.set(name.as_str(), value.as_str());
        }
        facade
    }

    /// Like `from_config`, building a `NetworkTransport` with the
    /// configured timeout.
    pub fn from_config_with_network(config: &ServiceConfig) -> Self {
        Self::from_config(config, Arc::new(NetworkTransport::with_timeout(config.timeout())))
    }

    pub fn with_start_tasks_immediately(mut self, start: bool) -> Self {
        self.start_tasks_immediately = start;
        self
    }

    /// Queue used by callbacks registered without an explicit one.
    pub fn with_completion_queue(mut self, queue: QueueRef) -> Self {
        self.completion_queue = queue;
        self
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.set(name, value);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn starts_tasks_immediately(&self) -> bool {
        self.start_tasks_immediately
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Resolve `path` against the base URL. Absolute URLs come back
    /// unchanged apart from normalization.
    pub fn absolute_url_string(&self, path: &str) -> Result<String, ServiceError> {
        resolve_url(&self.base_url, path)
    }

    /// The descriptor a verb call would compile: defaults, then `options`.
    pub fn descriptor(
        &self,
        method: HttpMethod,
        path: &str,
        parameters: Option<Parameters>,
        options: &[RequestOption],
    ) -> RequestDescriptor {
        self.default_headers
            .iter()
            .fold(RequestDescriptor::new(method, path), |descriptor, (name, value)| {
                descriptor.with_header(name, value)
            })
            .with_parameters(parameters)
            .apply(options)
    }

    pub fn request(
        &self,
        method: HttpMethod,
        path: &str,
        parameters: Option<Parameters>,
        options: &[RequestOption],
    ) -> ServiceTask {
        let queue = Arc::clone(&self.completion_queue);
        match self.descriptor(method, path, parameters, options).compile(&self.base_url) {
            Ok(request) => ServiceTask::new(request, self.transport.as_ref(), queue, self.start_tasks_immediately),
            Err(error) => {
                tracing::warn!(%method, path, %error, "request could not be compiled");
                ServiceTask::failed(error, queue)
            }
        }
    }

    pub fn get(&self, path: &str, parameters: Option<Parameters>, options: &[RequestOption]) -> ServiceTask {
        self.request(HttpMethod::Get, path, parameters, options)
    }

    pub fn post(&self, path: &str, parameters: Option<Parameters>, options: &[RequestOption]) -> ServiceTask {
        self.request(HttpMethod::Post, path, parameters, options)
    }

    pub fn put(&self, path: &str, parameters: Option<Parameters>, options: &[RequestOption]) -> ServiceTask {
        self.request(HttpMethod::Put, path, parameters, options)
    }

    pub fn delete(&self, path: &str, parameters: Option<Parameters>, options: &[RequestOption]) -> ServiceTask {
        self.request(HttpMethod::Delete, path, parameters, options)
    }

    pub fn head(&self, path: &str, parameters: Option<Parameters>, options: &[RequestOption]) -> ServiceTask {
        self.request(HttpMethod::Head, path, parameters, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockReply, MockTransport, TaskState};

    fn facade(base: &str) -> (ServiceFacade, MockTransport) {
        let transport = MockTransport::deferred(|_| MockReply::body(200, "{}"));
        (ServiceFacade::new(base, Arc::new(transport.clone())), transport)
    }

    #[test]
    fn absolute_url_string_joins_and_passes_through() {
        let (f, _) = facade("http://example.com/");
        assert_eq!(f.absolute_url_string("/foo").unwrap(), "http://example.com/foo");
        assert_eq!(f.absolute_url_string("http://other.com/x").unwrap(), "http://other.com/x");
    }

    #[test]
    fn tasks_start_immediately_by_default() {
        let (f, _) = facade("http://example.com/");
        assert_eq!(f.get("/a", None, &[]).state(), TaskState::Running);
    }

    #[test]
    fn disabling_auto_start_leaves_tasks_suspended() {
        let (f, transport) = facade("http://example.com/");
        let f = f.with_start_tasks_immediately(false);
        let task = f.get("/a", None, &[]);
        assert_eq!(task.state(), TaskState::Suspended);
        assert_eq!(transport.complete_pending(), 0);
        task.resume();
        assert_eq!(task.state(), TaskState::Running);
    }

    #[test]
    fn default_headers_are_sent_and_overridable() {
        let (f, transport) = facade("http://example.com/");
        f.get("/a", None, &[RequestOption::header("accept", "application/json")]);
        let sent = &transport.requests()[0];
        assert_eq!(sent.headers.get(USER_AGENT), Some(DEFAULT_USER_AGENT));
        assert_eq!(sent.headers.get(ACCEPT), Some("application/json"));
    }

    #[test]
    fn config_headers_and_policy_apply() {
        let mut config = ServiceConfig::new("http://example.com/api/");
        config.start_tasks_immediately = false;
        config.default_headers.insert("X-Client".to_string(), "tests".to_string());
        let transport = MockTransport::new(|_| MockReply::body(200, ""));
        let f = ServiceFacade::from_config(&config, Arc::new(transport.clone()));
        let task = f.delete("items/1", None, &[]);
        assert_eq!(task.state(), TaskState::Suspended);
        let sent = task.request().unwrap();
        assert_eq!(sent.url, "http://example.com/api/items/1");
        assert_eq!(sent.headers.get("x-client"), Some("tests"));
    }

    #[test]
    fn config_with_network_keeps_base_url_policy_and_headers() {
        let config = ServiceConfig::from_json(
            r#"{
                "base_url": "http://example.com/api/",
                "start_tasks_immediately": false,
                "default_headers": {"X-Client": "tests"},
                "timeout_secs": 5
            }"#,
        )
        .unwrap();
        let f = ServiceFacade::from_config_with_network(&config);
        assert_eq!(f.base_url(), "http://example.com/api/");
        assert!(!f.starts_tasks_immediately());
        let descriptor = f.descriptor(HttpMethod::Get, "items", None, &[]);
        assert_eq!(descriptor.headers().get("x-client"), Some("tests"));
        assert_eq!(descriptor.headers().get(USER_AGENT), Some(DEFAULT_USER_AGENT));
    }

    #[test]
    fn unresolvable_path_yields_completed_failed_task() {
        let (f, transport) = facade("not a base url");
        let task = f.get("/a", None, &[]);
        assert_eq!(task.state(), TaskState::Completed);
        assert!(transport.requests().is_empty());
    }
}
