//! Declarative HTTP client facade over a pluggable transport.
//!
//! # Overview
//! Callers describe a request (method, path, parameters, options) and get
//! back a `ServiceTask` on which they register success, JSON and error
//! callbacks. The core compiles the description into a `WireRequest` and
//! hands it to a `Transport`, which does the actual I/O and reports back
//! once.
//!
//! # Design
//! - `encoding` and `request` are pure: same input, same wire request.
//! - `Transport` is the only I/O seam. `NetworkTransport` uses `ureq`;
//!   `MockTransport` answers from a closure for tests.
//! - `ServiceTask` fans one completion out to every registered callback,
//!   each on the `CallbackQueue` it asked for.
//! - Failures travel through error callbacks only. Local encoding problems
//!   and non-JSON bodies degrade silently.

pub mod config;
pub mod encoding;
pub mod error;
pub mod facade;
pub mod http;
pub mod queue;
pub mod request;
pub mod task;
pub mod transport;

pub use config::ServiceConfig;
pub use encoding::{ParameterEncoding, Parameters};
pub use error::ServiceError;
pub use facade::ServiceFacade;
pub use http::{CachePolicy, Headers, HttpMethod, HttpResponse, WireRequest};
pub use queue::{CallbackQueue, InlineQueue, ManualQueue, QueueRef, SerialQueue};
pub use request::{RequestDescriptor, RequestOption};
pub use task::ServiceTask;
pub use transport::{MockReply, MockTransport, NetworkTransport, TaskState, Transport, TransportTask};
