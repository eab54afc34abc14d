//! Request descriptors and their compilation into wire requests.
//!
//! # Design
//! A `RequestDescriptor` is plain data describing what the caller asked for.
//! `RequestOption`s adjust it in order, later options overriding earlier ones
//! for the same field. `compile` turns it into a `WireRequest` without any
//! hidden state, so compiling the same descriptor against the same base URL
//! always yields the same result.
//!
//! Choosing an encoding re-derives the Content-Type header as an explicit
//! step inside `apply`. A `Header` option applied afterwards still wins.

use bytes::Bytes;
use url::Url;

use crate::encoding::{encode_body, encode_url, ParameterEncoding, Parameters};
use crate::error::ServiceError;
use crate::http::{
    CachePolicy, Headers, HttpMethod, WireRequest, CONTENT_LENGTH, CONTENT_TYPE, FORM_URLENCODED,
};

/// A declarative adjustment to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOption {
    ParameterEncoding(ParameterEncoding),
    Header(String, String),
    CachePolicy(CachePolicy),
}

impl RequestOption {
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        RequestOption::Header(name.into(), value.into())
    }
}

/// Everything needed to build one request, before URL resolution and
/// parameter placement.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub parameters: Option<Parameters>,
    headers: Headers,
    cache_policy: CachePolicy,
    parameter_encoding: ParameterEncoding,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            parameters: None,
            headers: Headers::new(),
            cache_policy: CachePolicy::default(),
            parameter_encoding: ParameterEncoding::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: Option<Parameters>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Seed a header before options are applied. Used for facade defaults.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Apply options in order.
    pub fn apply(mut self, options: &[RequestOption]) -> Self {
        for option in options {
            match option {
                RequestOption::ParameterEncoding(encoding) => {
                    self.parameter_encoding = *encoding;
                    self.derive_content_type();
                }
                RequestOption::Header(name, value) => self.headers.set(name.as_str(), value.as_str()),
                RequestOption::CachePolicy(policy) => self.cache_policy = *policy,
            }
        }
        self
    }

    fn derive_content_type(&mut self) {
        if let Some(content_type) = self.parameter_encoding.content_type() {
            self.headers.set(CONTENT_TYPE, content_type);
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn parameter_encoding(&self) -> ParameterEncoding {
        self.parameter_encoding
    }

    /// Resolve the path against `base_url` and place parameters per method.
    ///
    /// Query-string placement always uses percent encoding. Body placement
    /// uses the configured encoding and falls back to the form Content-Type
    /// when none was set.
    pub fn compile(&self, base_url: &str) -> Result<WireRequest, ServiceError> {
        let mut url = resolve_url(base_url, &self.path)?;
        let mut body = None;

        if let Some(parameters) = self.parameters.as_ref().filter(|p| !p.is_empty()) {
            if self.method.places_parameters_in_query() {
                match encode_url(&url, parameters) {
                    Some(encoded) => url = encoded,
                    None => tracing::warn!(url = %url, "parameters dropped from query string"),
                }
            } else {
                body = encode_body(self.parameter_encoding, parameters).map(Bytes::from);
            }
        }

        let mut headers = Headers::new();
        if let Some(body) = &body {
            headers.set(CONTENT_TYPE, FORM_URLENCODED);
            headers.set(CONTENT_LENGTH, body.len().to_string());
        }
        for (name, value) in self.headers.iter() {
            headers.set(name, value);
        }

        tracing::debug!(method = %self.method, url = %url, has_body = body.is_some(), "compiled request");
        Ok(WireRequest {
            method: self.method,
            url,
            headers,
            body,
            cache_policy: self.cache_policy,
        })
    }
}

/// Resolve `path` against `base_url` with standard relative-reference rules.
/// Absolute inputs replace the base entirely.
pub fn resolve_url(base_url: &str, path: &str) -> Result<String, ServiceError> {
    let invalid = |error: url::ParseError| ServiceError::InvalidUrl {
        url: path.to_string(),
        message: error.to_string(),
    };
    match Url::parse(path) {
        Ok(absolute) => Ok(absolute.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(base_url).map_err(|error| ServiceError::InvalidUrl {
                url: base_url.to_string(),
                message: error.to_string(),
            })?;
            base.join(path).map(String::from).map_err(invalid)
        }
        Err(error) => Err(invalid(error)),
    }
}
