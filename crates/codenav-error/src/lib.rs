//! Error types for the codenav proxy.
//!
//! One taxonomy covers the whole stack, from transport framing up to the
//! multi-server manager, so callers can match on a single enum regardless of
//! which layer produced the failure. Variants carry the context the upper
//! layers need for reporting: timeouts keep their method name, startup
//! failures aggregate per-language messages, RPC errors keep the server's
//! code and data payload.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use std::time::Duration;

/// Result alias used across the codenav crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error taxonomy for all codenav layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame parse error, stream closed mid-message, or process exited.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server returned a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC / LSP error code.
        code: i32,
        /// Server-provided message.
        message: String,
        /// Optional structured payload from the server.
        data: Option<serde_json::Value>,
    },

    /// A request exceeded its deadline. The method name is preserved for
    /// diagnostics.
    #[error("request {method} timed out after {elapsed:?}")]
    Timeout {
        /// Method of the timed-out request.
        method: String,
        /// How long the caller waited.
        elapsed: Duration,
    },

    /// The caller cancelled the request; `$/cancelRequest` has been emitted.
    #[error("request {method} was cancelled")]
    Cancelled {
        /// Method of the cancelled request.
        method: String,
    },

    /// Operation invoked before the session lifecycle reached "serving", or
    /// after it stopped.
    #[error("language server not started")]
    NotStarted,

    /// A result or argument path falls outside the repository root.
    #[error("path outside repository: {0}")]
    PathOutsideRepository(String),

    /// An operation addressed a language with no managed server.
    #[error("no language server for language: {0}")]
    NoSuchLanguage(String),

    /// A restart was required but no factory was supplied.
    #[error("no language server factory available: {0}")]
    FactoryUnavailable(String),

    /// One or more language servers failed during parallel startup.
    #[error("failed to start language servers: {}", format_failures(failures))]
    StartupFailed {
        /// Per-language `(language, message)` failure pairs.
        failures: Vec<(String, String)>,
    },

    /// The server does not support the requested capability.
    #[error("capability unsupported: {0}")]
    CapabilityUnsupported(String),

    /// Underlying I/O failure (file reads, child process plumbing).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// File contents could not be decoded in the repository encoding.
    #[error("encoding error: {0}")]
    Encoding(String),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(lang, msg)| format!("{}: {}", lang, msg))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Build an [`Error::Rpc`] from a raw error object's parts.
    pub fn rpc(code: i32, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Error::Rpc { code, message: message.into(), data }
    }

    /// True when the error indicates the session itself is unusable and the
    /// manager should recreate it before the next dispatch.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::NotStarted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_preserves_method_name() {
        let err = Error::Timeout {
            method: "textDocument/documentSymbol".to_string(),
            elapsed: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("textDocument/documentSymbol"));
    }

    #[test]
    fn startup_failure_aggregates_languages() {
        let err = Error::StartupFailed {
            failures: vec![
                ("python".to_string(), "spawn failed".to_string()),
                ("typescript".to_string(), "timeout".to_string()),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("python: spawn failed"));
        assert!(text.contains("typescript: timeout"));
    }

    #[test]
    fn transport_errors_are_fatal_to_session() {
        assert!(Error::Transport("stream closed".into()).is_fatal_to_session());
        assert!(!Error::Cancelled { method: "x".into() }.is_fatal_to_session());
    }
}
