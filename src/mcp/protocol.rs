use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::mcp::error::McpError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Bridge-side timeout waiting for the subprocess.
pub const REQUEST_TIMEOUT: i64 = -32000;
pub const INTERNAL_ERROR: i64 = -32603;

pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.to_string(),
            params,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Whether this response belongs to request `id`. A missing or `null` id
    /// is accepted, since servers use it for errors they cannot attribute.
    pub fn answers(&self, id: u64) -> bool {
        match &self.id {
            None | Some(Value::Null) => true,
            Some(other) => other.as_u64() == Some(id),
        }
    }

    /// Splits the response into its `result`, turning an error object into
    /// `McpError::ServerError`. A response with neither yields `Ok(None)`.
    pub fn into_result(self) -> Result<Option<Value>, McpError> {
        if let Some(error) = self.error {
            return Err(McpError::ServerError {
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Builds an error frame in the shape the bridge returns to HTTP callers.
pub fn error_frame(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": code, "message": message.into() },
    })
}

/// Streamable-HTTP servers may answer with an SSE body; keep the last `data:` payload.
pub fn parse_sse_response(body: &str) -> String {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:").map(|s| s.trim()))
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or(body)
        .to_string()
}

pub fn create_init_params() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
