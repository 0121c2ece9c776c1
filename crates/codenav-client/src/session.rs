//! Language-server sessions: one child process plus the machinery that
//! makes its stdio a correct JSON-RPC connection.

use crate::cancellation::CancellationToken;
use crate::launch::LaunchDescriptor;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::slot::{Completion, ResponseSlot};
use codenav_error::{Error, Result};
use codenav_protocol::{
    IncomingMessage, JsonRpcError, MessageShape, METHOD_NOT_FOUND, methods, notification,
    error_response, request as make_request, response as make_response,
};
use codenav_transport::{ReadOutcome, read_message, write_message};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::Child;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type RequestHandler =
    Box<dyn Fn(Option<Value>) -> std::result::Result<Value, JsonRpcError> + Send + Sync>;
type NotificationHandler = Box<dyn Fn(Option<Value>) + Send + Sync>;

/// Session-wide configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Applied when a request carries no per-call timeout.
    pub default_timeout: Duration,
    /// Token-bucket parameters; `None` disables rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    /// Log every outgoing request and incoming response at debug level.
    pub trace: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { default_timeout: Duration::from_secs(30), rate_limit: None, trace: false }
    }
}

/// Per-call options for [`ServerSession::request_with`].
#[derive(Default)]
pub struct RequestOptions {
    /// Overrides the session default timeout.
    pub timeout: Option<Duration>,
    /// Token the caller may cancel from another thread.
    pub token: Option<CancellationToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Spawned; `initialize` not yet completed.
    Created,
    /// Lifecycle complete; feature requests allowed.
    Serving,
    /// Stop requested or completed.
    Stopped,
}

struct PendingRequest {
    method: String,
    slot: Arc<ResponseSlot>,
    started: Instant,
}

struct SessionShared {
    writer: Mutex<Box<dyn Write + Send>>,
    outstanding: Mutex<HashMap<i64, Arc<PendingRequest>>>,
    request_handlers: RwLock<HashMap<String, RequestHandler>>,
    notification_handlers: RwLock<HashMap<String, NotificationHandler>>,
    next_id: AtomicI64,
    phase: Mutex<Phase>,
    running: AtomicBool,
    stopping: AtomicBool,
    rate_limiter: Option<RateLimiter>,
    default_timeout: Duration,
    trace: bool,
    server_info: Mutex<Option<(String, Option<String>)>>,
}

impl SessionShared {
    fn write_value(&self, value: &Value) -> Result<()> {
        let mut writer = self.writer.lock();
        if let Err(e) = write_message(&mut *writer, value) {
            drop(writer);
            self.mark_dead(&format!("stdin write failed: {}", e));
            return Err(Error::Transport(format!("stdin write failed: {}", e)));
        }
        Ok(())
    }

    /// Mark the session unusable and complete every outstanding future.
    /// During an orderly stop the futures resolve as Cancelled; on an
    /// unexpected transport death they resolve as Transport errors.
    fn mark_dead(&self, reason: &str) {
        self.running.store(false, Ordering::SeqCst);
        let entries: Vec<Arc<PendingRequest>> = {
            let mut outstanding = self.outstanding.lock();
            outstanding.drain().map(|(_, p)| p).collect()
        };
        if entries.is_empty() {
            return;
        }
        let stopping = self.stopping.load(Ordering::SeqCst);
        debug!(count = entries.len(), stopping, reason, "completing outstanding requests");
        for pending in entries {
            let completion = if stopping {
                Completion::Cancelled
            } else {
                Completion::Transport(reason.to_string())
            };
            pending.slot.complete(completion);
        }
    }
}

/// A running language-server session.
///
/// All public operations are safe for concurrent invocation from distinct
/// threads; per session, writes appear on the wire in the order `send`
/// calls return.
pub struct ServerSession {
    shared: Arc<SessionShared>,
    child: Mutex<Option<Child>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ServerSession {
    /// Spawn the child process described by `descriptor` and start the
    /// reader and stderr threads. The session is not serving until
    /// [`ServerSession::initialize`] completes.
    pub fn spawn(descriptor: &LaunchDescriptor, config: SessionConfig) -> Result<Self> {
        let mut command = descriptor.to_command()?;
        let mut child = command.spawn().map_err(|e| {
            Error::Transport(format!(
                "failed to spawn {:?}: {}",
                descriptor.command.first().map(String::as_str).unwrap_or(""),
                e
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("child stdout unavailable".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("child stdin unavailable".to_string()))?;
        let stderr = child.stderr.take();

        let session = Self::build(Box::new(stdout), Box::new(stdin), config);
        *session.child.lock() = Some(child);

        if let Some(stderr) = stderr {
            let handle = thread::Builder::new()
                .name("ls-stderr".to_string())
                .spawn(move || stderr_loop(stderr))
                .map_err(|e| Error::Transport(format!("failed to spawn stderr thread: {}", e)))?;
            session.threads.lock().push(handle);
        }

        Ok(session)
    }

    /// Build a session over arbitrary I/O, with no child process. This is
    /// the test-harness path: a scripted server on the other end of a pipe
    /// exercises the full runtime.
    pub fn with_io(reader: Box<dyn Read + Send>, writer: Box<dyn Write + Send>, config: SessionConfig) -> Self {
        Self::build(reader, writer, config)
    }

    fn build(reader: Box<dyn Read + Send>, writer: Box<dyn Write + Send>, config: SessionConfig) -> Self {
        let shared = Arc::new(SessionShared {
            writer: Mutex::new(writer),
            outstanding: Mutex::new(HashMap::new()),
            request_handlers: RwLock::new(HashMap::new()),
            notification_handlers: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            phase: Mutex::new(Phase::Created),
            running: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
            rate_limiter: config.rate_limit.map(RateLimiter::new),
            default_timeout: config.default_timeout,
            trace: config.trace,
            server_info: Mutex::new(None),
        });

        let reader_shared = Arc::clone(&shared);
        let threads = match thread::Builder::new()
            .name("ls-reader".to_string())
            .spawn(move || reader_loop(&reader_shared, reader))
        {
            Ok(handle) => vec![handle],
            Err(e) => {
                warn!(error = %e, "failed to spawn reader thread");
                shared.running.store(false, Ordering::SeqCst);
                Vec::new()
            }
        };

        Self { shared, child: Mutex::new(None), threads: Mutex::new(threads) }
    }

    /// Register a handler for a server-to-client request method.
    pub fn on_request(
        &self,
        method: impl Into<String>,
        handler: impl Fn(Option<Value>) -> std::result::Result<Value, JsonRpcError> + Send + Sync + 'static,
    ) {
        self.shared.request_handlers.write().insert(method.into(), Box::new(handler));
    }

    /// Register a handler for a server-to-client notification method.
    pub fn on_notification(
        &self,
        method: impl Into<String>,
        handler: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) {
        self.shared.notification_handlers.write().insert(method.into(), Box::new(handler));
    }

    /// Perform the LSP lifecycle handshake: `initialize`, await the reply,
    /// then send `initialized`. After this the session is serving.
    pub fn initialize(
        &self,
        root_uri: &str,
        capabilities: Value,
        initialization_options: Option<Value>,
    ) -> Result<Value> {
        {
            let phase = self.shared.phase.lock();
            if *phase != Phase::Created {
                return Err(Error::NotStarted);
            }
        }

        let params = json!({
            "processId": std::process::id(),
            "rootUri": root_uri,
            "capabilities": capabilities,
            "initializationOptions": initialization_options,
            "workspaceFolders": null,
        });

        let result =
            self.send_request_inner(methods::INITIALIZE, params, self.shared.default_timeout, None)?;

        if let Some(info) = result.get("serverInfo") {
            let name = info.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string();
            let version = info.get("version").and_then(Value::as_str).map(str::to_string);
            *self.shared.server_info.lock() = Some((name, version));
        }

        self.shared.write_value(&notification(methods::INITIALIZED, json!({})))?;
        *self.shared.phase.lock() = Phase::Serving;
        debug!(root_uri, "language server initialized");
        Ok(result)
    }

    /// Issue a request with the session defaults.
    pub fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.request_with(method, params, RequestOptions::default())
    }

    /// Issue a request with per-call timeout and/or cancellation token.
    ///
    /// Blocks the calling thread until the response arrives, the timeout
    /// elapses, or the token fires. Requests issued before the lifecycle
    /// reached serving (or after stop) fail with `NotStarted`.
    pub fn request_with(&self, method: &str, params: Value, options: RequestOptions) -> Result<Value> {
        {
            let phase = self.shared.phase.lock();
            if *phase != Phase::Serving {
                return Err(Error::NotStarted);
            }
        }

        if let Some(limiter) = &self.shared.rate_limiter {
            if !methods::is_lifecycle(method) {
                limiter.acquire();
            }
        }

        let timeout = options.timeout.unwrap_or(self.shared.default_timeout);
        self.send_request_inner(method, params, timeout, options.token)
    }

    /// Send a notification. Notifications are never rate limited.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(Error::NotStarted);
        }
        if self.shared.trace {
            debug!(method, "tx notification");
        }
        self.shared.write_value(&notification(method, params))
    }

    fn send_request_inner(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
        token: Option<CancellationToken>,
    ) -> Result<Value> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(Error::NotStarted);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let pending = Arc::new(PendingRequest {
            method: method.to_string(),
            slot: Arc::new(ResponseSlot::new()),
            started: Instant::now(),
        });
        self.shared.outstanding.lock().insert(id, Arc::clone(&pending));

        if let Some(token) = &token {
            let shared = Arc::clone(&self.shared);
            let cancel_method = method.to_string();
            token.attach(Box::new(move || {
                debug!(id, method = %cancel_method, "cancelling request");
                let _ = shared.write_value(&notification(methods::CANCEL_REQUEST, json!({ "id": id })));
                if let Some(pending) = shared.outstanding.lock().remove(&id) {
                    pending.slot.complete(Completion::Cancelled);
                }
            }));
        }

        if self.shared.trace {
            debug!(id, method, "tx request");
        }
        if let Err(e) = self.shared.write_value(&make_request(id, method, params)) {
            self.shared.outstanding.lock().remove(&id);
            return Err(e);
        }

        match pending.slot.wait(timeout) {
            None => {
                // The entry stays registered: a late response completes
                // the slot with nobody waiting, and shutdown drains
                // whatever never arrived.
                Err(Error::Timeout { method: method.to_string(), elapsed: timeout })
            }
            Some(completion) => {
                if let Some(token) = &token {
                    token.detach();
                }
                match completion {
                    Completion::Result(value) => Ok(value),
                    Completion::Error(e) => Err(Error::rpc(e.code, e.message, e.data)),
                    Completion::Cancelled => Err(Error::Cancelled { method: method.to_string() }),
                    Completion::Transport(reason) => Err(Error::Transport(reason)),
                }
            }
        }
    }

    /// Identity reported by the server in its `initialize` response.
    pub fn server_info(&self) -> Option<(String, Option<String>)> {
        self.shared.server_info.lock().clone()
    }

    /// Whether the transport is alive and the session has not been stopped.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether the lifecycle reached serving (and stop was not requested).
    pub fn is_serving(&self) -> bool {
        self.is_running() && *self.shared.phase.lock() == Phase::Serving
    }

    /// Number of requests currently awaiting responses.
    pub fn outstanding_count(&self) -> usize {
        self.shared.outstanding.lock().len()
    }

    /// Session default request timeout.
    pub fn default_timeout(&self) -> Duration {
        self.shared.default_timeout
    }

    /// Stop the session: `shutdown` (briefly awaited), `exit`, a bounded
    /// wait for the child, then force-kill and thread join. Every future
    /// still outstanding afterwards completes as Cancelled.
    pub fn stop(&self, timeout: Duration) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }

        let was_serving = {
            let mut phase = self.shared.phase.lock();
            let was = *phase == Phase::Serving;
            *phase = Phase::Stopped;
            was
        };

        if was_serving && self.shared.running.load(Ordering::SeqCst) {
            let shutdown_timeout = timeout.min(Duration::from_secs(2));
            match self.send_request_inner(methods::SHUTDOWN, Value::Null, shutdown_timeout, None) {
                Ok(_) => debug!("shutdown acknowledged"),
                Err(e) => debug!(error = %e, "shutdown request failed"),
            }
        }

        if self.shared.running.load(Ordering::SeqCst) {
            let _ = self.shared.write_value(&notification(methods::EXIT, Value::Null));
        }

        // Closing stdin tells well-behaved servers the conversation is over.
        *self.shared.writer.lock() = Box::new(std::io::sink());

        let deadline = Instant::now() + timeout;
        if let Some(mut child) = self.child.lock().take() {
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug!(?status, "language server exited");
                        break;
                    }
                    Ok(None) => {
                        if Instant::now() >= deadline {
                            warn!("language server did not exit in time; killing");
                            let _ = child.kill();
                            let _ = child.wait();
                            break;
                        }
                        thread::sleep(Duration::from_millis(25));
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to poll language server exit");
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                }
            }
        }

        self.shared.mark_dead("session stopped");

        let handles: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("session thread panicked");
            }
        }
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        if !self.shared.stopping.load(Ordering::SeqCst) {
            self.stop(Duration::from_secs(2));
        }
    }
}

fn reader_loop(shared: &Arc<SessionShared>, reader: Box<dyn Read + Send>) {
    let mut reader = BufReader::new(reader);
    loop {
        match read_message(&mut reader) {
            Ok(ReadOutcome::Message(message)) => dispatch(shared, message),
            Ok(ReadOutcome::Malformed) => {
                // Frame consumed, stream still in sync; keep serving.
                continue;
            }
            Ok(ReadOutcome::Eof) => {
                debug!("language server closed its stdout");
                break;
            }
            Err(e) => {
                warn!(error = %e, "unrecoverable framing error; closing connection");
                break;
            }
        }
    }
    shared.mark_dead("server stream closed");
}

fn dispatch(shared: &Arc<SessionShared>, message: IncomingMessage) {
    match message.classify() {
        MessageShape::Response => {
            let Some(id) = message.id.as_ref().and_then(Value::as_i64) else {
                warn!("response with non-integer id discarded");
                return;
            };
            let pending = shared.outstanding.lock().remove(&id);
            match pending {
                Some(pending) => {
                    if shared.trace {
                        debug!(
                            id,
                            method = %pending.method,
                            elapsed = ?pending.started.elapsed(),
                            "rx response"
                        );
                    }
                    let completion = match message.error {
                        Some(error) => Completion::Error(error),
                        None => Completion::Result(message.result.unwrap_or(Value::Null)),
                    };
                    if !pending.slot.complete(completion) {
                        debug!(id, "response for already-completed request discarded");
                    }
                }
                None => {
                    // Cancelled or timed-out-and-drained request.
                    debug!(id, "response for unknown request id discarded");
                }
            }
        }
        MessageShape::Request => {
            let method = message.method.unwrap_or_default();
            let id = message.id.unwrap_or(Value::Null);
            if shared.trace {
                debug!(%id, method = %method, "rx server request");
            }
            let reply = {
                let handlers = shared.request_handlers.read();
                match handlers.get(&method) {
                    Some(handler) => handler(message.params),
                    None => Err(JsonRpcError::new(
                        METHOD_NOT_FOUND,
                        format!("no client handler for {}", method),
                    )),
                }
            };
            let frame = match reply {
                Ok(result) => make_response(&id, result),
                Err(error) => error_response(&id, &error),
            };
            let _ = shared.write_value(&frame);
        }
        MessageShape::Notification => {
            let method = message.method.unwrap_or_default();
            let handlers = shared.notification_handlers.read();
            match handlers.get(&method) {
                Some(handler) => handler(message.params),
                None => debug!(method = %method, "notification discarded"),
            }
        }
        MessageShape::Invalid => {
            warn!("message with neither id nor method discarded");
        }
    }
}

fn stderr_loop(stderr: std::process::ChildStderr) {
    let reader = BufReader::new(stderr);
    for line in reader.lines() {
        match line {
            Ok(line) => debug!(target: "codenav::ls_stderr", "{}", line),
            Err(_) => break,
        }
    }
}
