//! Request cancellation tokens.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type CancelHook = Box<dyn FnOnce() + Send>;

struct TokenInner {
    cancelled: AtomicBool,
    hook: Mutex<Option<CancelHook>>,
}

/// A cancellation token that can be associated with one request.
///
/// Cancelling emits `$/cancelRequest` for the associated request and
/// completes its awaiter with a cancellation error. Cancelling does not
/// make the server stop working; a response that still arrives is
/// discarded by the reader.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Create an un-cancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                hook: Mutex::new(None),
            }),
        }
    }

    /// Fast atomic check.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Cancel. The first call runs the attached hook (emit the wire
    /// notification, complete the awaiter); later calls are no-ops.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let hook = self.inner.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Attach the session-side hook for the request this token guards.
    ///
    /// If the token was already cancelled the hook runs immediately.
    /// A token is good for one request; attaching again replaces the hook.
    pub(crate) fn attach(&self, hook: CancelHook) {
        if self.is_cancelled() {
            hook();
            return;
        }
        let mut slot = self.inner.hook.lock();
        // Re-check under the lock so a concurrent cancel cannot strand the hook.
        if self.is_cancelled() {
            drop(slot);
            hook();
        } else {
            *slot = Some(hook);
        }
    }

    /// Drop the hook once the request completed normally.
    pub(crate) fn detach(&self) {
        self.inner.hook.lock().take();
    }
}
