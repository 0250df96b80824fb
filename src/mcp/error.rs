//! MCP connection error types.

use thiserror::Error;

/// Errors raised inside the connection layer.
///
/// Only bridge provisioning (`SpawnFailed`, `BridgeBind`) and explicit
/// restarts surface these to callers; steady-state operations fold them into
/// `bool`/`Option`/empty results.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server subprocess could not be started.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The bridge listener could not be bound.
    #[error("failed to bind bridge listener for '{name}': {reason}")]
    BridgeBind { name: String, reason: String },

    /// Network failure or malformed response.
    #[error("transport error for server '{server}': {reason}")]
    Transport { server: String, reason: String },

    #[error("request to server '{server}' timed out after {timeout_ms}ms")]
    Timeout { server: String, timeout_ms: u64 },

    /// The endpoint answered with a non-success HTTP status.
    #[error("server '{server}' returned HTTP status {status}")]
    HttpStatus { server: String, status: u16 },

    /// The server answered with a JSON-RPC error object.
    #[error("server error [{code}]: {message}")]
    ServerError { code: i64, message: String },

    #[error("server '{server}' has no open session")]
    NotConnected { server: String },

    #[error("unknown server: '{name}'")]
    UnknownServer { name: String },

    /// A descriptor is unusable for the requested operation.
    #[error("invalid descriptor for '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },
}
