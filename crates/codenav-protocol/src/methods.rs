//! LSP method name constants for request routing and lifecycle handling.
//!
//! Centralizing the identifiers keeps the runtime's dispatch logic, the
//! rate-limiter exemptions, and the test harnesses in agreement about
//! spelling. All constants follow LSP 3.17 naming.

// -----------------------------------------------------------------------------
// Lifecycle
// -----------------------------------------------------------------------------

/// `initialize` request
pub const INITIALIZE: &str = "initialize";
/// `initialized` notification
pub const INITIALIZED: &str = "initialized";
/// `shutdown` request
pub const SHUTDOWN: &str = "shutdown";
/// `exit` notification
pub const EXIT: &str = "exit";
/// `$/cancelRequest` notification
pub const CANCEL_REQUEST: &str = "$/cancelRequest";

// -----------------------------------------------------------------------------
// Text document synchronization
// -----------------------------------------------------------------------------

/// `textDocument/didOpen` notification
pub const TEXT_DOCUMENT_DID_OPEN: &str = "textDocument/didOpen";
/// `textDocument/didChange` notification
pub const TEXT_DOCUMENT_DID_CHANGE: &str = "textDocument/didChange";
/// `textDocument/didClose` notification
pub const TEXT_DOCUMENT_DID_CLOSE: &str = "textDocument/didClose";

// -----------------------------------------------------------------------------
// Language features
// -----------------------------------------------------------------------------

/// `textDocument/documentSymbol` request
pub const TEXT_DOCUMENT_DOCUMENT_SYMBOL: &str = "textDocument/documentSymbol";
/// `textDocument/definition` request
pub const TEXT_DOCUMENT_DEFINITION: &str = "textDocument/definition";
/// `textDocument/references` request
pub const TEXT_DOCUMENT_REFERENCES: &str = "textDocument/references";
/// `textDocument/rename` request
pub const TEXT_DOCUMENT_RENAME: &str = "textDocument/rename";
/// `textDocument/hover` request
pub const TEXT_DOCUMENT_HOVER: &str = "textDocument/hover";

// -----------------------------------------------------------------------------
// Call hierarchy
// -----------------------------------------------------------------------------

/// `textDocument/prepareCallHierarchy` request
pub const TEXT_DOCUMENT_PREPARE_CALL_HIERARCHY: &str = "textDocument/prepareCallHierarchy";
/// `callHierarchy/incomingCalls` request
pub const CALL_HIERARCHY_INCOMING_CALLS: &str = "callHierarchy/incomingCalls";
/// `callHierarchy/outgoingCalls` request
pub const CALL_HIERARCHY_OUTGOING_CALLS: &str = "callHierarchy/outgoingCalls";

// -----------------------------------------------------------------------------
// Workspace features
// -----------------------------------------------------------------------------

/// `workspace/symbol` request
pub const WORKSPACE_SYMBOL: &str = "workspace/symbol";
/// `workspace/configuration` server-to-client request
pub const WORKSPACE_CONFIGURATION: &str = "workspace/configuration";

// -----------------------------------------------------------------------------
// Server-to-client traffic
// -----------------------------------------------------------------------------

/// `window/logMessage` notification
pub const WINDOW_LOG_MESSAGE: &str = "window/logMessage";
/// `window/showMessage` notification
pub const WINDOW_SHOW_MESSAGE: &str = "window/showMessage";
/// `window/workDoneProgress/create` server-to-client request
pub const WINDOW_WORK_DONE_PROGRESS_CREATE: &str = "window/workDoneProgress/create";
/// `client/registerCapability` server-to-client request
pub const CLIENT_REGISTER_CAPABILITY: &str = "client/registerCapability";
/// `$/progress` notification
pub const PROGRESS: &str = "$/progress";

/// True for the lifecycle methods that bypass rate limiting.
pub fn is_lifecycle(method: &str) -> bool {
    matches!(method, INITIALIZE | SHUTDOWN | EXIT)
}
