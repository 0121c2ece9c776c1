//! LSP transport layer for codenav.
//!
//! Implements Content-Length based message framing as specified in the LSP
//! Base Protocol. The reader tolerates arbitrary extra headers (read and
//! ignored, case-insensitively); the writer emits only `Content-Length`,
//! since some servers reject frames carrying anything else.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod framing;

pub use framing::{MAX_CONTENT_LENGTH, ReadOutcome, read_message, write_message};
