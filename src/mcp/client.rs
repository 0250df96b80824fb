use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::mcp::error::McpError;
use crate::mcp::protocol::{create_init_params, parse_sse_response, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::types::{McpPrompt, McpResource, McpTool, ServerStatus};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RESPONSE_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Total bound on each outbound call.
    pub timeout: Duration,
    pub max_response_bytes: usize,
    pub headers: HashMap<String, String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_response_bytes: DEFAULT_RESPONSE_LIMIT,
            headers: HashMap::new(),
        }
    }
}

struct Session {
    http: Option<HttpClient>,
    next_request_id: u64,
    capabilities: Value,
    last_health_check: Option<DateTime<Utc>>,
}

/// JSON-RPC client bound to one HTTP endpoint.
///
/// Requests are serialized through the session lock, so at most one call is
/// in flight per client and ids leave in strictly increasing order.
pub struct McpClient {
    server_id: String,
    endpoint: String,
    name: String,
    options: ClientOptions,
    connected: AtomicBool,
    session: Mutex<Session>,
}

impl McpClient {
    pub fn new(server_id: &str, endpoint: &str, name: &str, options: ClientOptions) -> Self {
        let name = if name.is_empty() { server_id } else { name };
        Self {
            server_id: server_id.to_string(),
            endpoint: endpoint.to_string(),
            name: name.to_string(),
            options,
            connected: AtomicBool::new(false),
            session: Mutex::new(Session {
                http: None,
                next_request_id: 0,
                capabilities: json!({}),
                last_health_check: None,
            }),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn capabilities(&self) -> Value {
        self.session.lock().await.capabilities.clone()
    }

    pub async fn status(&self) -> ServerStatus {
        let session = self.session.lock().await;
        ServerStatus {
            server_id: self.server_id.clone(),
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            connected: self.is_connected(),
            capabilities: session.capabilities.clone(),
            last_health_check: session.last_health_check,
        }
    }

    /// Opens the session if needed and performs the `initialize` handshake.
    /// Failures are logged and reported as `false`.
    pub async fn connect(&self) -> bool {
        let mut session = self.session.lock().await;

        if session.http.is_none() {
            match self.build_http_client() {
                Ok(http) => session.http = Some(http),
                Err(e) => {
                    error!("Failed to connect to MCP server {}: {}", self.name, e);
                    self.connected.store(false, Ordering::SeqCst);
                    return false;
                }
            }
        }

        let response = self
            .send(&mut session, "initialize", Some(create_init_params()))
            .await;

        match response {
            Ok(JsonRpcResponse {
                result: Some(result),
                ..
            }) => {
                session.capabilities = result
                    .get("capabilities")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                self.connected.store(true, Ordering::SeqCst);
                info!("Connected to MCP server {} at {}", self.name, self.endpoint);
                true
            }
            Ok(response) => {
                let reason = response
                    .error
                    .map(|e| format!("{} (code: {})", e.message, e.code))
                    .unwrap_or_else(|| "no result in initialize response".to_string());
                error!("Failed to connect to MCP server {}: {}", self.name, reason);
                self.connected.store(false, Ordering::SeqCst);
                false
            }
            Err(e) => {
                error!("Failed to connect to MCP server {}: {}", self.name, e);
                false
            }
        }
    }

    /// Drops the HTTP session. The client can `connect()` again later.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        session.http = None;
        self.connected.store(false, Ordering::SeqCst);
        info!("Disconnected from MCP server {}", self.name);
    }

    pub async fn list_resources(&self) -> Vec<McpResource> {
        self.try_list_resources()
            .await
            .unwrap_or_else(|e| self.log_empty("resources/list", e))
    }

    pub async fn try_list_resources(&self) -> Result<Vec<McpResource>, McpError> {
        let result = self.call("resources/list", None).await?;
        Ok(extract_list(result, "resources"))
    }

    pub async fn read_resource(&self, uri: &str) -> Option<Value> {
        self.call("resources/read", Some(json!({ "uri": uri })))
            .await
            .unwrap_or_else(|e| self.log_none("resources/read", e))
    }

    pub async fn list_tools(&self) -> Vec<McpTool> {
        self.try_list_tools()
            .await
            .unwrap_or_else(|e| self.log_empty("tools/list", e))
    }

    pub async fn try_list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let result = self.call("tools/list", None).await?;
        Ok(extract_list(result, "tools"))
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Option<Value> {
        self.try_call_tool(tool_name, arguments)
            .await
            .map(|result| (!result.is_null()).then_some(result))
            .unwrap_or_else(|e| self.log_none("tools/call", e))
    }

    /// Like `call_tool` but keeps the failure; a missing `result` is `Null`.
    pub async fn try_call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let params = json!({
            "name": tool_name,
            "arguments": arguments,
        });

        Ok(self
            .call("tools/call", Some(params))
            .await?
            .unwrap_or(Value::Null))
    }

    pub async fn list_prompts(&self) -> Vec<McpPrompt> {
        match self.call("prompts/list", None).await {
            Ok(result) => extract_list(result, "prompts"),
            Err(e) => self.log_empty("prompts/list", e),
        }
    }

    /// Returns the text of the first message of the rendered prompt.
    pub async fn get_prompt(&self, prompt_name: &str, arguments: Value) -> Option<String> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let params = json!({
            "name": prompt_name,
            "arguments": arguments,
        });

        let result = self
            .call("prompts/get", Some(params))
            .await
            .unwrap_or_else(|e| self.log_none("prompts/get", e))?;

        let first = result.get("messages")?.as_array()?.first()?;
        Some(
            first
                .get("content")
                .and_then(|content| content.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        )
    }

    /// `true` iff `ping` got any JSON-RPC answer back.
    pub async fn health_check(&self) -> bool {
        let mut session = self.session.lock().await;
        session.last_health_check = Some(Utc::now());

        match self.send(&mut session, "ping", None).await {
            Ok(_) => true,
            Err(e) => {
                debug!("[{}] Health check failed: {}", self.name, e);
                false
            }
        }
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Option<Value>, McpError> {
        if !self.is_connected() {
            self.connect().await;
        }

        let mut session = self.session.lock().await;
        self.send(&mut session, method, params).await?.into_result()
    }

    /// Issues one request while the caller holds the session lock.
    /// Transport failures mark the client disconnected.
    async fn send(
        &self,
        session: &mut Session,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let http = session
            .http
            .clone()
            .ok_or_else(|| McpError::NotConnected {
                server: self.name.clone(),
            })?;

        session.next_request_id += 1;
        let request = JsonRpcRequest::new(session.next_request_id, method, params);

        let response = self.post(&http, &request).await;
        if let Err(e) = &response {
            if matches!(e, McpError::Timeout { .. }) {
                error!("Request to MCP server {} timed out", self.name);
            }
            self.connected.store(false, Ordering::SeqCst);
        }
        response
    }

    async fn post(
        &self,
        http: &HttpClient,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, McpError> {
        debug!(
            "[{}] -> {} (id {})",
            self.name,
            request.method(),
            request.id()
        );

        let http_response = http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = http_response.status();
        if !status.is_success() {
            warn!("MCP server {} returned status {}", self.name, status);
            return Err(McpError::HttpStatus {
                server: self.name.clone(),
                status: status.as_u16(),
            });
        }

        let content_type = http_response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = http_response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        if body.len() > self.options.max_response_bytes {
            return Err(McpError::Transport {
                server: self.name.clone(),
                reason: format!(
                    "response of {} bytes exceeds limit of {}",
                    body.len(),
                    self.options.max_response_bytes
                ),
            });
        }

        let body = String::from_utf8_lossy(&body);
        let json_str = if content_type.contains("text/event-stream") {
            parse_sse_response(&body)
        } else {
            body.into_owned()
        };
        debug!(
            "[{}] <- {}",
            self.name,
            json_str.chars().take(500).collect::<String>()
        );

        let response: JsonRpcResponse =
            serde_json::from_str(&json_str).map_err(|e| McpError::Transport {
                server: self.name.clone(),
                reason: format!("malformed JSON-RPC response: {e}"),
            })?;

        if !response.answers(request.id()) {
            return Err(McpError::Transport {
                server: self.name.clone(),
                reason: format!(
                    "response id {:?} does not match request id {}",
                    response.id,
                    request.id()
                ),
            });
        }
        Ok(response)
    }

    fn build_http_client(&self) -> Result<HttpClient, McpError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.options.headers {
            let name = HeaderName::from_bytes(key.as_bytes());
            let value = HeaderValue::from_str(value);
            match (name, value) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("[{}] Ignoring invalid header '{}'", self.name, key),
            }
        }

        HttpClient::builder()
            .timeout(self.options.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| McpError::Transport {
                server: self.name.clone(),
                reason: format!("failed to build HTTP session: {e}"),
            })
    }

    fn transport_error(&self, e: reqwest::Error) -> McpError {
        if e.is_timeout() {
            McpError::Timeout {
                server: self.name.clone(),
                timeout_ms: self.options.timeout.as_millis() as u64,
            }
        } else {
            McpError::Transport {
                server: self.name.clone(),
                reason: e.to_string(),
            }
        }
    }

    fn log_empty<T>(&self, method: &str, e: McpError) -> Vec<T> {
        warn!("[{}] {} failed: {}", self.name, method, e);
        Vec::new()
    }

    fn log_none<T>(&self, method: &str, e: McpError) -> Option<T> {
        warn!("[{}] {} failed: {}", self.name, method, e);
        None
    }
}

/// Pulls `result[field]` as a list, dropping items that do not deserialize.
fn extract_list<T: DeserializeOwned>(result: Option<Value>, field: &str) -> Vec<T> {
    let Some(Value::Array(items)) = result.and_then(|mut r| r.get_mut(field).map(Value::take))
    else {
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}
