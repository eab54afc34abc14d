//! Parameter encoding for query strings and request bodies.
//!
//! # Design
//! Two strategies exist. Percent encoding renders every value as text and
//! joins `name=value` pairs with `&`; it is the only strategy that can target
//! a query string. JSON encoding serializes the whole parameter map and is
//! only meaningful for bodies.
//!
//! Encoding never fails loudly: a problem is logged and the output is
//! absent, which callers treat as "no parameters were encoded".

use std::borrow::Cow;
use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::http::APPLICATION_JSON;

/// Request parameters. Pair order is unspecified.
pub type Parameters = HashMap<String, Value>;

/// Characters escaped in names and values. Alphanumerics, `-._~` and the
/// punctuation `!*'();:@$,/?[]` pass through untouched. The delimiters
/// `&`, `=`, `+`, `%` and `#` are always escaped so every pair decodes back
/// to exactly what was sent.
const PARAMETER_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b':')
    .remove(b'@')
    .remove(b'$')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b'[')
    .remove(b']');

/// How parameters are turned into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterEncoding {
    #[default]
    Percent,
    Json,
}

impl ParameterEncoding {
    /// Content-Type implied by choosing this encoding, if any.
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            ParameterEncoding::Percent => None,
            ParameterEncoding::Json => Some(APPLICATION_JSON),
        }
    }
}

/// Text form of a parameter value: strings verbatim, null as empty, arrays
/// and objects as compact JSON.
pub fn render_value(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        other => Cow::Owned(other.to_string()),
    }
}

/// Percent-encode every pair and join them as `a=1&b=2`.
pub fn percent_encode_pairs(parameters: &Parameters) -> String {
    parameters
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(name, PARAMETER_ENCODE_SET),
                utf8_percent_encode(&render_value(value), PARAMETER_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Append percent-encoded parameters to the query string of `url`.
///
/// An existing query is preserved and extended with `&`; a fragment stays at
/// the end. Returns `None` when `url` is not an absolute URL.
pub fn encode_url(url: &str, parameters: &Parameters) -> Option<String> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(error) => {
            tracing::warn!(url, %error, "cannot encode parameters into an unparsable URL");
            return None;
        }
    };
    let serialized = String::from(parsed);
    let query = percent_encode_pairs(parameters);
    if query.is_empty() {
        return Some(serialized);
    }

    let (head, fragment) = match serialized.find('#') {
        Some(index) => serialized.split_at(index),
        None => (serialized.as_str(), ""),
    };
    let separator = match head.find('?') {
        None => "?",
        Some(_) if head.ends_with('?') || head.ends_with('&') => "",
        Some(_) => "&",
    };
    Some(format!("{head}{separator}{query}{fragment}"))
}

/// Encode parameters as a request body using `encoding`.
///
/// Returns `None` when nothing could be encoded.
pub fn encode_body(encoding: ParameterEncoding, parameters: &Parameters) -> Option<Vec<u8>> {
    match encoding {
        ParameterEncoding::Percent => {
            let encoded = percent_encode_pairs(parameters);
            (!encoded.is_empty()).then(|| encoded.into_bytes())
        }
        ParameterEncoding::Json => match serde_json::to_vec(parameters) {
            Ok(bytes) => Some(bytes),
            // Not expected to run: string-keyed `Value` maps always serialize.
            Err(error) => {
                tracing::warn!(%error, "JSON parameter encoding failed; sending no body");
                None
            }
        },
    }
}
