use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::mcp::McpError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<McpError> for ApiError {
    fn from(error: McpError) -> Self {
        match error {
            McpError::UnknownServer { name } => ApiError::NotFound(format!("Server '{name}' not found")),
            McpError::InvalidDescriptor { .. } => ApiError::InvalidRequest(error.to_string()),
            McpError::SpawnFailed { .. } | McpError::BridgeBind { .. } => {
                ApiError::Provisioning(error.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            ApiError::Provisioning(msg) => {
                (StatusCode::BAD_GATEWAY, "PROVISIONING_ERROR", msg.clone())
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
