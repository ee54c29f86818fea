//! # JSON-RPC 2.0 Message Shapes
//!
//! The task execution protocol between the orchestrator and a provider
//! (§6 External interfaces). Only the message shape is modeled here; the
//! transport itself (HTTP framing, a socket, an in-process channel) is an
//! external concern.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved JSON-RPC error codes (§6). Application-defined codes occupy
/// `-32000..=-32099`.
pub mod reserved_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const APPLICATION_ERROR_MIN: i64 = -32099;
    pub const APPLICATION_ERROR_MAX: i64 = -32000;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// `-32601` and `-32602` are treated as non-retryable by the
    /// orchestrator (§6); every other application/transport-level code is
    /// retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.code,
            reserved_codes::METHOD_NOT_FOUND | reserved_codes::INVALID_PARAMS
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponse {
    Success { jsonrpc: String, id: String, result: Value },
    Error { jsonrpc: String, id: String, error: JsonRpcError },
}

impl JsonRpcResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        JsonRpcResponse::Success {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result,
        }
    }

    pub fn error(id: impl Into<String>, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        JsonRpcResponse::Error {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            error: JsonRpcError {
                code,
                message: message.into(),
                data,
            },
        }
    }

    pub fn id(&self) -> &str {
        match self {
            JsonRpcResponse::Success { id, .. } => id,
            JsonRpcResponse::Error { id, .. } => id,
        }
    }
}
