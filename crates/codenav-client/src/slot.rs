//! Blocking one-shot response slots.
//!
//! The reader thread is the single producer of responses; each awaiting
//! caller blocks on its request's slot until the reader (or a canceller)
//! completes it. A slot completes exactly once; later attempts are ignored,
//! which is how responses arriving after cancellation get discarded.

use codenav_protocol::JsonRpcError;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Terminal state of a pending request, before mapping into the public
/// error taxonomy (the slot does not know the method name).
#[derive(Debug)]
pub(crate) enum Completion {
    /// The server answered with a result.
    Result(Value),
    /// The server answered with an error object.
    Error(JsonRpcError),
    /// A canceller or session teardown completed the request.
    Cancelled,
    /// The transport died while the request was in flight.
    Transport(String),
}

pub(crate) struct ResponseSlot {
    state: Mutex<Option<Completion>>,
    ready: Condvar,
}

impl ResponseSlot {
    pub(crate) fn new() -> Self {
        Self { state: Mutex::new(None), ready: Condvar::new() }
    }

    /// Complete the slot. Returns false when it was already completed.
    pub(crate) fn complete(&self, completion: Completion) -> bool {
        let mut state = self.state.lock();
        if state.is_some() {
            return false;
        }
        *state = Some(completion);
        self.ready.notify_all();
        true
    }

    /// Block until completed or the deadline passes. `None` means timeout;
    /// the slot stays registered so a late response can still be observed
    /// (and discarded) by the reader.
    pub(crate) fn wait(&self, timeout: Duration) -> Option<Completion> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(completion) = state.take() {
                return Some(completion);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            self.ready.wait_for(&mut state, deadline - now);
        }
    }
}
