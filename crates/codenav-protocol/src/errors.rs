//! JSON-RPC and LSP error code constants.

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i32 = -32700;

/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i32 = -32600;

/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i32 = -32603;

/// A request was sent before the server answered `initialize`.
pub const SERVER_NOT_INITIALIZED: i32 = -32002;

/// The client cancelled the request via `$/cancelRequest`.
pub const REQUEST_CANCELLED: i32 = -32800;

/// The document changed while the request was in flight.
pub const CONTENT_MODIFIED: i32 = -32801;

/// The server failed to handle an otherwise valid request.
pub const REQUEST_FAILED: i32 = -32803;
