//! Echo server used to exercise the client core over real HTTP.
//!
//! - `ANY /echo[/*rest]` answers with a JSON description of the request it
//!   received (method, path, raw query, headers, body as text).
//! - `GET /text` answers with a body that is not JSON.
//! - `ANY /status/{code}` answers with an empty body and the given status.
//! - `GET /bytes/{count}` answers with `count` bytes of `x`, up to
//!   `MAX_BYTES`.
//! - `GET /redirect/{*rest}` redirects to `/echo/{rest}`.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::Path,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::Redirect,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What `/echo` saw.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Lower-cased header names; repeated headers are joined with `, `.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub const TEXT_BODY: &str = "plain text, definitely not JSON";

/// Largest body `/bytes/{count}` will produce.
pub const MAX_BYTES: usize = 32 * 1024 * 1024;

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/echo/{*rest}", any(echo))
        .route("/text", get(text))
        .route("/status/{code}", any(status))
        .route("/bytes/{count}", get(bytes))
        .route("/redirect/{*rest}", get(redirect))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    tracing::debug!(%method, %uri, "echo");
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: collected,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn text() -> &'static str {
    TEXT_BODY
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn bytes(Path(count): Path<usize>) -> Result<Vec<u8>, StatusCode> {
    if count > MAX_BYTES {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(vec![b'x'; count])
}

async fn redirect(Path(rest): Path<String>) -> Redirect {
    Redirect::to(&format!("/echo/{rest}"))
}
