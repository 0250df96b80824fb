#![allow(dead_code)]

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use mcp_connector::mcp::{ServerDescriptor, Transport};

/// Stdio MCP stand-in: answers every request line with `result` set to the
/// request's `params` (or `{}`), and never answers method `slow`.
pub const ECHO_SCRIPT: &str = r##"
while IFS= read -r line; do
  case "$line" in
    *'"method":"slow"'*) continue ;;
    *'"id":'*) ;;
    *) continue ;;
  esac
  id=${line#*\"id\":}
  id=${id%%,*}
  case "$line" in
    *'"params":'*) params=${line#*\"params\":}; params=${params%\}} ;;
    *) params='{}' ;;
  esac
  printf '{"jsonrpc":"2.0","id":%s,"result":%s}\n' "$id" "$params"
done
"##;

pub fn echo_descriptor(name: &str, timeout_ms: u64) -> ServerDescriptor {
    script_descriptor(name, ECHO_SCRIPT, HashMap::new(), timeout_ms)
}

pub fn script_descriptor(
    name: &str,
    script: &str,
    env: HashMap<String, String>,
    timeout_ms: u64,
) -> ServerDescriptor {
    ServerDescriptor {
        name: name.to_string(),
        transport: Transport::Stdio {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env,
        },
        timeout_ms,
    }
}

#[derive(Default)]
pub struct StubBehavior {
    /// Delay before every answer.
    pub delay: Duration,
    /// Methods answered with a JSON-RPC error object.
    pub rpc_errors: Vec<&'static str>,
    /// Methods answered with HTTP 500.
    pub http_errors: Vec<&'static str>,
    /// Methods answered under a different request id.
    pub wrong_ids: Vec<&'static str>,
}

pub struct StubState {
    behavior: StubBehavior,
    pub ids: Mutex<Vec<u64>>,
    pub methods: Mutex<Vec<String>>,
    pub headers: Mutex<Vec<HashMap<String, String>>>,
}

/// HTTP MCP server on an ephemeral port with canned answers.
pub struct StubServer {
    pub url: String,
    pub state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(behavior: StubBehavior) -> Self {
        let state = Arc::new(StubState {
            behavior,
            ids: Mutex::new(Vec::new()),
            methods: Mutex::new(Vec::new()),
            headers: Mutex::new(Vec::new()),
        });

        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new()
            .route("/", post(answer))
            .with_state(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, state, handle }
    }

    pub fn ids(&self) -> Vec<u64> {
        self.state.ids.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.state.methods.lock().unwrap().clone()
    }

    pub fn last_headers(&self) -> HashMap<String, String> {
        self.state
            .headers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn answer(
    State(state): State<Arc<StubState>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    if let Some(id) = request["id"].as_u64() {
        state.ids.lock().unwrap().push(id);
    }
    state.methods.lock().unwrap().push(method.clone());
    state.headers.lock().unwrap().push(
        headers
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect(),
    );

    tokio::time::sleep(state.behavior.delay).await;

    let id = if state.behavior.wrong_ids.contains(&method.as_str()) {
        json!(request["id"].as_u64().unwrap_or_default() + 100)
    } else {
        request["id"].clone()
    };
    if state.behavior.http_errors.contains(&method.as_str()) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if state.behavior.rpc_errors.contains(&method.as_str()) {
        return Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .into_response();
    }

    let result = match method.as_str() {
        "initialize" => json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {"tools": {}, "resources": {}},
            "serverInfo": {"name": "stub", "version": "1.0.0"}
        }),
        "tools/list" => json!({
            "tools": [{"name": "echo", "description": "Echo input", "inputSchema": {"type": "object"}}]
        }),
        "resources/list" => json!({
            "resources": [{"uri": "file:///notes.txt", "name": "notes", "mimeType": "text/plain"}]
        }),
        "resources/read" => json!({
            "contents": [{"uri": request["params"]["uri"], "text": "hello"}]
        }),
        "prompts/list" => json!({"prompts": [{"name": "greet"}]}),
        "prompts/get" => json!({
            "messages": [{"role": "user", "content": {"type": "text", "text": "Say hi"}}]
        }),
        "tools/call" => json!({
            "content": [{"type": "text", "text": request["params"]["arguments"].to_string()}]
        }),
        _ => json!({}),
    };

    Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
}
