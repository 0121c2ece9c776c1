//! JSON-RPC 2.0 message types
//!
//! Core request, response, notification, and error types for the client side
//! of a JSON-RPC connection to a language server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An incoming JSON-RPC message of unknown shape.
///
/// Language servers send three kinds of traffic on the same stream:
/// responses to our requests, their own requests (which expect a response
/// from us), and notifications. The combination of `id` and `method`
/// determines which one a frame is; see [`IncomingMessage::classify`].
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    /// Message identifier; present for requests and responses.
    pub id: Option<Value>,

    /// Method name; present for requests and notifications.
    pub method: Option<String>,

    /// Request/notification parameters.
    pub params: Option<Value>,

    /// Success payload of a response.
    pub result: Option<Value>,

    /// Error payload of a response.
    pub error: Option<JsonRpcError>,
}

/// Shape of an incoming message after classification.
#[derive(Debug)]
pub enum MessageShape {
    /// Server-to-client request: has both `id` and `method`.
    Request,
    /// Response to one of our requests: has `id` but no `method`.
    Response,
    /// Notification: has `method` but no `id`.
    Notification,
    /// Neither `id` nor `method`; not valid JSON-RPC traffic.
    Invalid,
}

impl IncomingMessage {
    /// Classify this message by the presence of `id` and `method`.
    pub fn classify(&self) -> MessageShape {
        match (self.id.is_some(), self.method.is_some()) {
            (true, true) => MessageShape::Request,
            (true, false) => MessageShape::Response,
            (false, true) => MessageShape::Notification,
            (false, false) => MessageShape::Invalid,
        }
    }
}

/// Build an outgoing JSON-RPC request object.
pub fn request(id: i64, method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
}

/// Build an outgoing JSON-RPC notification object.
pub fn notification(method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
}

/// Build an outgoing success response for a server-to-client request.
pub fn response(id: &Value, result: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

/// Build an outgoing error response for a server-to-client request.
pub fn error_response(id: &Value, error: &JsonRpcError) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": error
    })
}

/// JSON-RPC 2.0 error object
///
/// Carried in responses from the server; codes follow JSON-RPC conventions
/// with the LSP augmentation (see [`crate::errors`] for the constants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error data (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    /// Create an error with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self { code, message: message.into(), data: Some(data) }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}
