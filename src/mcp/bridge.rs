//! Exposes a stdio MCP server as a local HTTP JSON-RPC endpoint.
//!
//! Each bridge owns one subprocess and one `POST /` listener on an ephemeral
//! loopback port. Requests are relayed one at a time: the body goes to stdin
//! as a single line and the matching line from stdout comes back as the
//! response body.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::mcp::error::McpError;
use crate::mcp::protocol::{error_frame, INTERNAL_ERROR, REQUEST_TIMEOUT};
use crate::mcp::types::{ServerDescriptor, Transport};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Stdout lines buffered between requests. When full, the reader stops
/// pulling from the pipe until the next request drains it.
const STDOUT_BACKLOG: usize = 256;

pub struct StdioBridge {
    descriptor: ServerDescriptor,
    running: Option<RunningBridge>,
}

struct RunningBridge {
    child: Child,
    port: u16,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

struct BridgeShared {
    name: String,
    timeout: Duration,
    pipe: Mutex<Pipe>,
}

struct Pipe {
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
}

impl StdioBridge {
    pub fn new(descriptor: ServerDescriptor) -> Self {
        Self {
            descriptor,
            running: None,
        }
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn port(&self) -> Option<u16> {
        self.running.as_ref().map(|r| r.port)
    }

    pub fn url(&self) -> Option<String> {
        self.port().map(bridge_url)
    }

    /// Spawns the subprocess and binds the listener. Either both come up or
    /// neither is left behind; the error is returned to the caller.
    pub async fn start(&mut self) -> Result<String, McpError> {
        if let Some(url) = self.url() {
            return Ok(url);
        }

        let name = self.descriptor.name.clone();
        let Transport::Stdio { command, args, env } = &self.descriptor.transport else {
            return Err(McpError::InvalidDescriptor {
                name,
                reason: "bridge requires a stdio transport".to_string(),
            });
        };

        let mut child = spawn_process(&name, command, args, env)?;

        let listener = match TcpListener::bind(("127.0.0.1", 0)).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = child.kill().await;
                error!("Failed to start STDIO bridge for {}: {}", name, e);
                return Err(McpError::BridgeBind {
                    name,
                    reason: e.to_string(),
                });
            }
        };

        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                let _ = child.kill().await;
                return Err(McpError::BridgeBind {
                    name,
                    reason: e.to_string(),
                });
            }
        };

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), stderr) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill().await;
                return Err(McpError::SpawnFailed {
                    name,
                    reason: "failed to capture stdio pipes".to_string(),
                });
            }
        };

        let (line_tx, line_rx) = mpsc::channel(STDOUT_BACKLOG);
        tokio::spawn(forward_stdout(name.clone(), stdout, line_tx));
        if let Some(stderr) = stderr {
            tokio::spawn(log_stderr(name.clone(), stderr));
        }

        let shared = Arc::new(BridgeShared {
            name: name.clone(),
            timeout: Duration::from_millis(self.descriptor.timeout_ms),
            pipe: Mutex::new(Pipe {
                stdin,
                lines: line_rx,
            }),
        });

        let app = Router::new().route("/", post(relay)).with_state(shared);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_name = name.clone();
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                error!("STDIO bridge listener for {} failed: {}", server_name, e);
            }
        });

        self.running = Some(RunningBridge {
            child,
            port,
            shutdown: shutdown_tx,
            server,
        });

        info!("Started STDIO bridge for {} on port {}", name, port);
        Ok(bridge_url(port))
    }

    /// Kills the subprocess, then tears down the listener. No-op when not running.
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        if let Err(e) = running.child.start_kill() {
            debug!("[{}] Subprocess already gone: {}", self.descriptor.name, e);
        }
        if tokio::time::timeout(STOP_TIMEOUT, running.child.wait())
            .await
            .is_err()
        {
            warn!("[{}] Subprocess did not exit in time", self.descriptor.name);
        }

        let _ = running.shutdown.send(());
        if tokio::time::timeout(STOP_TIMEOUT, &mut running.server)
            .await
            .is_err()
        {
            running.server.abort();
        }

        info!("Stopped STDIO bridge for {}", self.descriptor.name);
    }
}

impl Drop for StdioBridge {
    fn drop(&mut self) {
        if let Some(running) = &mut self.running {
            let _ = running.child.start_kill();
            running.server.abort();
        }
    }
}

fn bridge_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

fn spawn_process(
    name: &str,
    command: &str,
    args: &[String],
    env: &std::collections::HashMap<String, String>,
) -> Result<Child, McpError> {
    let mut parts = command.split_whitespace();
    let program = parts.next().unwrap_or(command);

    let mut process_cmd = Command::new(program);
    process_cmd
        .args(parts)
        .args(args)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!("Starting MCP server: {} ({})", name, command);
    process_cmd.spawn().map_err(|e| {
        error!("Failed to start STDIO bridge for {}: {}", name, e);
        McpError::SpawnFailed {
            name: name.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Pushes each stdout line into `tx`. Bytes that are not UTF-8 are replaced
/// rather than ending the stream, so the reader sees them as noise.
async fn forward_stdout<R: AsyncRead + Unpin>(name: String, stdout: R, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("[{}] stdout closed", name);
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("[{}] Failed reading stdout: {}", name, e);
                break;
            }
        }
    }
}

async fn log_stderr(name: String, stderr: tokio::process::ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    while let Ok(n) = reader.read_until(b'\n', &mut buf).await {
        if n == 0 {
            break;
        }
        debug!("[{}] stderr: {}", name, String::from_utf8_lossy(&buf).trim_end());
        buf.clear();
    }
}

async fn relay(State(shared): State<Arc<BridgeShared>>, body: Bytes) -> Response {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Bridge request error for {}: {}", shared.name, e);
            return rpc_failure(StatusCode::INTERNAL_SERVER_ERROR, Value::Null, INTERNAL_ERROR, e.to_string());
        }
    };
    if !request.is_object() {
        error!("Bridge request error for {}: body is not a JSON-RPC object", shared.name);
        return rpc_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            Value::Null,
            INTERNAL_ERROR,
            "Request must be a single JSON-RPC object",
        );
    }
    let id = request.get("id").cloned();

    let mut pipe = shared.pipe.lock().await;
    pipe.discard_stale(&shared.name);

    if let Err(e) = pipe.write_line(&request).await {
        error!("Bridge request error for {}: {}", shared.name, e);
        return rpc_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            id.unwrap_or(Value::Null),
            INTERNAL_ERROR,
            e.to_string(),
        );
    }

    // Notifications get no reply on stdout.
    let Some(id) = id else {
        return StatusCode::ACCEPTED.into_response();
    };

    match tokio::time::timeout(shared.timeout, pipe.read_response(&shared.name, &id)).await {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(reason)) => {
            error!("Bridge request error for {}: {}", shared.name, reason);
            rpc_failure(StatusCode::INTERNAL_SERVER_ERROR, id, INTERNAL_ERROR, reason)
        }
        Err(_) => {
            warn!(
                "[{}] No response within {}ms",
                shared.name,
                shared.timeout.as_millis()
            );
            rpc_failure(StatusCode::GATEWAY_TIMEOUT, id, REQUEST_TIMEOUT, "Request timeout")
        }
    }
}

fn rpc_failure(status: StatusCode, id: Value, code: i64, message: impl Into<String>) -> Response {
    (status, Json(error_frame(id, code, message))).into_response()
}

impl Pipe {
    /// Drops lines left over from requests that already timed out.
    fn discard_stale(&mut self, name: &str) {
        while let Ok(line) = self.lines.try_recv() {
            debug!("[{}] Discarding stale output: {}", name, line);
        }
    }

    async fn write_line(&mut self, request: &Value) -> std::io::Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await
    }

    /// Waits for the stdout line answering `id`, skipping log noise and
    /// answers to other ids. Cancel-safe: unread lines stay in the channel.
    async fn read_response(&mut self, name: &str, id: &Value) -> Result<Value, String> {
        loop {
            let line = self
                .lines
                .recv()
                .await
                .ok_or_else(|| "Server closed stdout unexpectedly".to_string())?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response: Value = match serde_json::from_str(trimmed) {
                Ok(response) => response,
                Err(_) => {
                    debug!("[{}] Ignored non-JSON-RPC output: {}", name, trimmed);
                    continue;
                }
            };

            match response.get("id") {
                Some(response_id) if response_id == id => return Ok(response),
                Some(Value::Null) if response.get("error").is_some() => return Ok(response),
                _ => debug!("[{}] Ignored unrelated message: {}", name, trimmed),
            }
        }
    }
}
