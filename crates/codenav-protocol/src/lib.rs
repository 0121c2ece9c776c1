//! JSON-RPC protocol types and method constants for codenav.
//!
//! This crate isolates the wire-level message model from the client runtime
//! so it can be shared across the transport layer, the session runtime, and
//! test harnesses. It deliberately knows nothing about processes or threads:
//! everything here is plain data.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod errors;
mod jsonrpc;
pub mod methods;

pub use errors::*;
pub use jsonrpc::*;
