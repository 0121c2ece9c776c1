//! A scripted in-process language server for integration tests.
//!
//! The mock runs on its own thread behind a pair of anonymous pipes and
//! speaks real Content-Length framing, so sessions built with
//! [`crate::ServerSession::with_io`] exercise the entire runtime: framing,
//! correlation, cancellation, lifecycle, and shutdown. Not part of the
//! supported runtime API; enabled for tests via the `test-support` feature.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use codenav_protocol::{JsonRpcError, MessageShape};
use codenav_transport::{ReadOutcome, read_message, write_message};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::io::{BufReader, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What the scripted server does with one incoming request.
pub enum MockReply {
    /// Respond with this result.
    Result(Value),
    /// Respond with this error.
    Error(JsonRpcError),
    /// Send no response at all (for timeout and cancellation tests).
    Ignore,
    /// Write these raw JSON-RPC messages verbatim, in order. The handler is
    /// responsible for including a response to the triggering request if
    /// one is wanted.
    Messages(Vec<Value>),
    /// Write these raw bytes verbatim (for malformed-frame tests).
    Bytes(Vec<u8>),
    /// Drop the connection immediately (for crash tests).
    Hangup,
}

/// Handler invoked for every request that is not auto-answered. Arguments
/// are the method name, the request id, and the params.
pub type MockHandler = Box<dyn FnMut(&str, &Value, Option<&Value>) -> MockReply + Send>;

/// Observable state of a running mock server.
pub struct MockServerHandle {
    notifications: Arc<Mutex<Vec<(String, Value)>>>,
    client_responses: Arc<Mutex<Vec<Value>>>,
    thread: Option<JoinHandle<()>>,
}

impl MockServerHandle {
    /// All notifications received so far with the given method.
    pub fn notifications_named(&self, method: &str) -> Vec<Value> {
        self.notifications
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Poll until at least one notification with `method` arrives.
    pub fn wait_for_notification(&self, method: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !self.notifications_named(method).is_empty() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    /// Responses the client sent to server-initiated requests.
    pub fn client_responses(&self) -> Vec<Value> {
        self.client_responses.lock().clone()
    }

    /// Poll until the client answered at least `count` server requests.
    pub fn wait_for_client_responses(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.client_responses.lock().len() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    /// Wait for the server loop to finish (it exits on `exit` or EOF).
    pub fn join(mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

// No join on drop: the loop thread exits on its own once the client side
// sends `exit` or closes the pipe, and joining here would deadlock tests
// that drop the handle while the session is still open.

/// Start a scripted server. Returns the handle plus the client's ends of
/// the pipes, ready for [`crate::ServerSession::with_io`].
///
/// `initialize` and `shutdown` are auto-answered when the handler returns
/// [`MockReply::Ignore`] for them, so most scripts only describe feature
/// methods. The loop exits on the `exit` notification, closing the pipe and
/// giving the client reader its EOF.
#[allow(clippy::type_complexity)]
pub fn start_mock_server(
    mut handler: MockHandler,
) -> (MockServerHandle, Box<dyn Read + Send>, Box<dyn Write + Send>) {
    let (client_read, mut server_write) = std::io::pipe().expect("pipe");
    let (server_read, client_write) = std::io::pipe().expect("pipe");

    let notifications: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let client_responses: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let notifications_in_loop = Arc::clone(&notifications);
    let responses_in_loop = Arc::clone(&client_responses);

    let thread = thread::Builder::new()
        .name("mock-ls".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(server_read);
            loop {
                let message = match read_message(&mut reader) {
                    Ok(ReadOutcome::Message(m)) => m,
                    Ok(ReadOutcome::Malformed) => continue,
                    Ok(ReadOutcome::Eof) | Err(_) => break,
                };
                match message.classify() {
                    MessageShape::Request => {
                        let method = message.method.clone().unwrap_or_default();
                        let id = message.id.clone().unwrap_or(Value::Null);
                        let reply = handler(&method, &id, message.params.as_ref());
                        let reply = match reply {
                            MockReply::Ignore => default_lifecycle_reply(&method),
                            other => other,
                        };
                        match reply {
                            MockReply::Result(result) => {
                                let _ = write_message(
                                    &mut server_write,
                                    &codenav_protocol::response(&id, result),
                                );
                            }
                            MockReply::Error(error) => {
                                let _ = write_message(
                                    &mut server_write,
                                    &codenav_protocol::error_response(&id, &error),
                                );
                            }
                            MockReply::Ignore => {}
                            MockReply::Messages(values) => {
                                for value in values {
                                    let _ = write_message(&mut server_write, &value);
                                }
                            }
                            MockReply::Bytes(bytes) => {
                                let _ = server_write.write_all(&bytes);
                                let _ = server_write.flush();
                            }
                            MockReply::Hangup => break,
                        }
                    }
                    MessageShape::Notification => {
                        let method = message.method.unwrap_or_default();
                        let params = message.params.unwrap_or(Value::Null);
                        let is_exit = method == "exit";
                        notifications_in_loop.lock().push((method, params));
                        if is_exit {
                            break;
                        }
                    }
                    MessageShape::Response => {
                        let record = json!({
                            "id": message.id,
                            "result": message.result,
                            "error": message.error.map(|e| json!({"code": e.code, "message": e.message})),
                        });
                        responses_in_loop.lock().push(record);
                    }
                    MessageShape::Invalid => {}
                }
            }
            // server_write drops here, delivering EOF to the client reader.
        })
        .expect("spawn mock server thread");

    (
        MockServerHandle { notifications, client_responses, thread: Some(thread) },
        Box::new(client_read),
        Box::new(client_write),
    )
}

/// Auto-answers for lifecycle methods the script left to the harness.
fn default_lifecycle_reply(method: &str) -> MockReply {
    match method {
        "initialize" => MockReply::Result(json!({
            "capabilities": {
                "textDocumentSync": 1,
                "documentSymbolProvider": true,
                "definitionProvider": true,
                "referencesProvider": true,
                "renameProvider": true,
                "hoverProvider": true,
                "workspaceSymbolProvider": true,
            },
            "serverInfo": { "name": "mock-ls", "version": "1.0.0" }
        })),
        "shutdown" => MockReply::Result(Value::Null),
        _ => MockReply::Ignore,
    }
}

/// A handler that answers every feature request with the given result.
pub fn constant_handler(result: Value) -> MockHandler {
    Box::new(move |_method, _id, _params| MockReply::Result(result.clone()))
}

/// A handler that never answers feature requests (lifecycle still works).
pub fn silent_handler() -> MockHandler {
    Box::new(|_method, _id, _params| MockReply::Ignore)
}
