//! Lifecycle behavior of [`ServerSession`] against a scripted server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use codenav_client::mock::{MockHandler, MockReply, constant_handler, start_mock_server};
use codenav_client::{ServerSession, SessionConfig};
use codenav_error::Error;
use serde_json::{Value, json};
use std::time::Duration;

fn started_session(handler: MockHandler) -> (ServerSession, codenav_client::mock::MockServerHandle) {
    let (handle, reader, writer) = start_mock_server(handler);
    let session = ServerSession::with_io(reader, writer, SessionConfig::default());
    session.initialize("file:///repo", json!({}), None).expect("initialize");
    (session, handle)
}

#[test]
fn initialize_then_serve_then_stop() {
    let (session, handle) = started_session(constant_handler(json!([])));

    assert!(session.is_serving());
    assert_eq!(
        session.server_info(),
        Some(("mock-ls".to_string(), Some("1.0.0".to_string())))
    );

    let result = session.request("textDocument/documentSymbol", json!({"textDocument": {}}));
    assert_eq!(result.unwrap(), json!([]));

    session.stop(Duration::from_secs(2));
    assert!(!session.is_serving());
    assert_eq!(session.outstanding_count(), 0);

    // The mock saw the full shutdown sequence.
    handle.join();
}

#[test]
fn request_before_initialize_is_not_started() {
    let (_handle, reader, writer) = start_mock_server(constant_handler(json!(null)));
    let session = ServerSession::with_io(reader, writer, SessionConfig::default());

    match session.request("textDocument/hover", json!({})) {
        Err(Error::NotStarted) => {}
        other => panic!("expected NotStarted, got {:?}", other.map(|_| ())),
    }
    session.stop(Duration::from_millis(200));
}

#[test]
fn request_after_stop_is_not_started() {
    let (session, _handle) = started_session(constant_handler(json!(null)));
    session.stop(Duration::from_secs(2));

    match session.request("textDocument/hover", json!({})) {
        Err(Error::NotStarted) => {}
        other => panic!("expected NotStarted, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn stop_is_idempotent() {
    let (session, _handle) = started_session(constant_handler(json!(null)));
    session.stop(Duration::from_secs(2));
    session.stop(Duration::from_secs(2));
    assert!(!session.is_running());
}

#[test]
fn initialized_notification_follows_initialize_response() {
    let (session, handle) = started_session(constant_handler(json!(null)));
    assert!(handle.wait_for_notification("initialized", Duration::from_secs(2)));
    session.stop(Duration::from_secs(2));
}

#[test]
fn server_error_response_maps_to_rpc_error() {
    let handler: MockHandler = Box::new(|method, _id, _params| {
        if method == "workspace/symbol" {
            MockReply::Error(codenav_protocol::JsonRpcError::new(-32803, "index not ready"))
        } else {
            MockReply::Ignore
        }
    });
    let (session, _handle) = started_session(handler);

    match session.request("workspace/symbol", json!({"query": "x"})) {
        Err(Error::Rpc { code, message, .. }) => {
            assert_eq!(code, -32803);
            assert!(message.contains("index not ready"));
        }
        other => panic!("expected Rpc error, got {:?}", other.map(|_| ())),
    }
    session.stop(Duration::from_secs(2));
}

#[test]
fn empty_result_is_success_not_failure() {
    let (session, _handle) = started_session(constant_handler(Value::Null));
    let result = session.request("textDocument/definition", json!({})).unwrap();
    assert_eq!(result, Value::Null);
    session.stop(Duration::from_secs(2));
}

#[test]
fn notifications_are_not_correlated() {
    let (session, handle) = started_session(constant_handler(json!(null)));
    session
        .notify("textDocument/didOpen", json!({"textDocument": {"uri": "file:///repo/a.rs"}}))
        .unwrap();
    assert!(handle.wait_for_notification("textDocument/didOpen", Duration::from_secs(2)));
    assert_eq!(session.outstanding_count(), 0);
    session.stop(Duration::from_secs(2));
}
