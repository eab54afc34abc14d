//! Error types surfaced through `ServiceTask` error callbacks.
//!
//! # Design
//! Only failures that prevent a response from arriving are errors. HTTP
//! status codes are response data, not errors. Encoding problems on the
//! request side and JSON decoding problems on the response side degrade
//! silently and never produce a `ServiceError`.
//!
//! The type is `Clone` because one failure fans out to every registered
//! error callback.

/// Failure reported to error callbacks.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The transport could not complete the round-trip (connection refused,
    /// DNS failure, timeout, malformed request).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The request path could not be resolved against the base URL.
    #[error("invalid URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    /// The task was cancelled before a response was delivered.
    #[error("request cancelled")]
    Cancelled,
}

impl ServiceError {
    pub fn transport(message: impl Into<String>) -> Self {
        ServiceError::Transport {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled)
    }
}

impl From<ureq::Error> for ServiceError {
    fn from(error: ureq::Error) -> Self {
        ServiceError::transport(error.to_string())
    }
}
