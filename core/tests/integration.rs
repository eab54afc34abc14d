//! Round-trips against the live mock server through `NetworkTransport`.
//!
//! # Design
//! Starts the echo server on a random port, then drives every verb through
//! a real `ServiceFacade`. Callbacks forward into channels so each test can
//! wait for the asynchronous completion with a timeout.

use std::collections::HashSet;
use std::sync::mpsc;
use std::time::Duration;

use mock_server::{Echo, TEXT_BODY};
use serde_json::json;
use service_core::transport::network::WORKER_THREAD_NAME;
use service_core::{
    HttpMethod, ParameterEncoding, Parameters, RequestOption, SerialQueue, ServiceError, ServiceFacade,
    TaskState,
};

const WAIT: Duration = Duration::from_secs(10);

/// Start the mock server on a random port and return its base URL.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}/")
}

fn echo_of(task: service_core::ServiceTask) -> Echo {
    let (tx, rx) = mpsc::channel();
    let tx_err = tx.clone();
    let _task = task
        .response_json(move |value| tx.send(Ok(value)).unwrap())
        .response_error(move |error| tx_err.send(Err(error)).unwrap());
    let value = rx.recv_timeout(WAIT).unwrap().unwrap();
    serde_json::from_value(value).unwrap()
}

fn params() -> Parameters {
    [("q".to_string(), json!("hello world")), ("n".to_string(), json!(3))]
        .into_iter()
        .collect()
}

fn pairs(encoded: &str) -> HashSet<String> {
    encoded.split('&').map(str::to_string).collect()
}

#[test]
fn get_sends_parameters_in_query() {
    let facade = ServiceFacade::with_network(start_server());
    let echo = echo_of(facade.get("/echo/items", Some(params()), &[]));

    assert_eq!(echo.method, "GET");
    assert_eq!(echo.path, "/echo/items");
    assert_eq!(
        pairs(echo.query.as_deref().unwrap()),
        HashSet::from(["q=hello%20world".to_string(), "n=3".to_string()])
    );
    assert!(echo.body.is_empty());
    assert!(echo.headers["user-agent"].starts_with("service-core/"));
}

#[test]
fn delete_sends_parameters_in_query() {
    let facade = ServiceFacade::with_network(start_server());
    let echo = echo_of(facade.delete("/echo/items/1", Some(params()), &[]));

    assert_eq!(echo.method, "DELETE");
    assert!(echo.query.is_some());
    assert!(echo.body.is_empty());
}

#[test]
fn post_sends_form_body() {
    let facade = ServiceFacade::with_network(start_server());
    let echo = echo_of(facade.post("/echo", Some(params()), &[]));

    assert_eq!(echo.method, "POST");
    assert_eq!(echo.query, None);
    assert_eq!(pairs(&echo.body), HashSet::from(["q=hello%20world".to_string(), "n=3".to_string()]));
    assert_eq!(echo.headers["content-type"], "application/x-www-form-urlencoded");
}

#[test]
fn put_sends_json_body() {
    let facade = ServiceFacade::with_network(start_server());
    let echo = echo_of(facade.put(
        "/echo",
        Some(params()),
        &[
            RequestOption::ParameterEncoding(ParameterEncoding::Json),
            RequestOption::header("X-Request-Source", "integration"),
        ],
    ));

    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.headers["content-type"], "application/json");
    assert_eq!(echo.headers["x-request-source"], "integration");
    let body: serde_json::Value = serde_json::from_str(&echo.body).unwrap();
    assert_eq!(body, json!({"q": "hello world", "n": 3}));
}

#[test]
fn head_returns_metadata_without_body() {
    let facade = ServiceFacade::with_network(start_server());
    let (tx, rx) = mpsc::channel();
    let _task = facade
        .head("/echo", None, &[])
        .response(move |data, response| tx.send((data, response)).unwrap());
    let (data, response) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(response.unwrap().status, 200);
    assert!(data.map_or(true, |d| d.is_empty()));
}

#[test]
fn non_json_body_skips_json_callback_only() {
    let facade = ServiceFacade::with_network(start_server());
    let (tx_json, rx_json) = mpsc::channel();
    let (tx_raw, rx_raw) = mpsc::channel();
    let _task = facade
        .get("/text", None, &[])
        .response_json(move |value| tx_json.send(value).unwrap())
        .response(move |data, _| tx_raw.send(data).unwrap());

    let data = rx_raw.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(&data[..], TEXT_BODY.as_bytes());
    assert!(rx_json.try_recv().is_err());
}

#[test]
fn error_status_is_delivered_as_response() {
    let facade = ServiceFacade::with_network(start_server());
    let (tx, rx) = mpsc::channel();
    let tx_err = tx.clone();
    let _task = facade
        .request(HttpMethod::Get, "/status/503", None, &[])
        .response(move |_, response| tx.send(Ok(response.unwrap().status)).unwrap())
        .response_error(move |error| tx_err.send(Err(error)).unwrap());
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Ok(503));
}

#[test]
fn unreachable_server_reaches_error_callback() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let facade = ServiceFacade::with_network(format!("http://127.0.0.1:{port}/"));
    let (tx, rx) = mpsc::channel();
    let tx_ok = tx.clone();
    let _task = facade
        .get("/echo", None, &[])
        .response(move |_, _| tx_ok.send(None).unwrap())
        .response_error(move |error| tx.send(Some(error)).unwrap());
    let error = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert!(matches!(error, ServiceError::Transport { .. }));
    assert!(rx.try_recv().is_err());
}

#[test]
fn callbacks_run_on_requested_serial_queue() {
    let facade = ServiceFacade::with_network(start_server());
    let queue = std::sync::Arc::new(SerialQueue::new("responses").unwrap());
    let (tx, rx) = mpsc::channel();
    let _task = facade.get("/echo", None, &[]).response_on(queue, move |_, _| {
        tx.send(std::thread::current().name().map(str::to_string)).unwrap()
    });
    assert_eq!(rx.recv_timeout(WAIT).unwrap().as_deref(), Some("responses"));
}

#[test]
fn suspended_task_waits_for_resume() {
    let facade = ServiceFacade::with_network(start_server()).with_start_tasks_immediately(false);
    let (tx, rx) = mpsc::channel();
    let task = facade.get("/echo", None, &[]).response(move |_, r| tx.send(r.map(|r| r.status)).unwrap());
    assert_eq!(task.state(), TaskState::Suspended);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    task.resume();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(200));
    assert_eq!(task.state(), TaskState::Completed);
}

#[test]
fn bodies_beyond_ten_megabytes_are_read_in_full() {
    let facade = ServiceFacade::with_network(start_server());
    let size = 12 * 1024 * 1024;
    let (tx, rx) = mpsc::channel();
    let tx_err = tx.clone();
    let _task = facade
        .get(&format!("/bytes/{size}"), None, &[])
        .response(move |data, _| tx.send(Ok(data.map_or(0, |d| d.len()))).unwrap())
        .response_error(move |error| tx_err.send(Err(error)).unwrap());
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Ok(size));
}

#[test]
fn redirected_response_reports_final_url() {
    let facade = ServiceFacade::with_network(start_server());
    let (tx, rx) = mpsc::channel();
    let _task = facade
        .get("/redirect/items", None, &[])
        .response(move |data, response| tx.send((data, response)).unwrap());
    let (data, response) = rx.recv_timeout(WAIT).unwrap();
    let response = response.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.url.ends_with("/echo/items"), "{}", response.url);
    let echo: Echo = serde_json::from_slice(&data.unwrap()).unwrap();
    assert_eq!(echo.path, "/echo/items");
}

#[test]
fn inline_callbacks_run_on_request_thread() {
    let facade = ServiceFacade::with_network(start_server());
    let (tx, rx) = mpsc::channel();
    let _task = facade
        .get("/echo", None, &[])
        .response(move |_, _| tx.send(std::thread::current().name().map(str::to_string)).unwrap());
    assert_eq!(rx.recv_timeout(WAIT).unwrap().as_deref(), Some(WORKER_THREAD_NAME));
}
