//! LSP client runtime for codenav.
//!
//! A [`ServerSession`] owns one language-server child process and provides a
//! correct, bidirectional JSON-RPC 2.0 stream over its stdio: Content-Length
//! framing, request/response correlation, server-initiated request handling,
//! notification dispatch, rate limiting, timeouts, cancellation, and the
//! initialize → initialized → serving → shutdown lifecycle.
//!
//! The runtime is protocol-complete but strictly mechanical: apart from the
//! lifecycle handshake it never interprets LSP method semantics. Higher
//! layers decide what to send; this crate makes sure it arrives, correlates,
//! and comes back.
//!
//! Scheduling is plain OS threads with blocking I/O. Each session owns one
//! reader thread, one stderr thread, and a writer mutex; callers may invoke
//! every public operation concurrently from arbitrary threads.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod cancellation;
mod launch;
mod rate_limit;
mod session;
mod slot;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use cancellation::CancellationToken;
pub use launch::LaunchDescriptor;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use session::{RequestOptions, ServerSession, SessionConfig};
