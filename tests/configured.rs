#![cfg(unix)]

mod common;

use common::{StubBehavior, StubServer, ECHO_SCRIPT};
use mcp_connector::mcp::{
    ConfigLoader, ConfiguredMcpManager, ManagerOptions, McpError, McpManager, TransportKind,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    mcp: ConfiguredMcpManager,
}

impl Fixture {
    fn new(max_connections: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(McpManager::new(ManagerOptions {
            max_connections,
            request_timeout: Duration::from_secs(5),
            ..ManagerOptions::default()
        }));
        let loader = ConfigLoader::with_roots(dir.path().join("home"), dir.path().join("cwd"));
        Self {
            mcp: ConfiguredMcpManager::new(registry, loader),
            dir,
        }
    }

    fn project(&self) -> std::path::PathBuf {
        self.dir.path().join("project")
    }

    fn write_global(&self, file: &str, config: Value) {
        write(
            &self.dir.path().join("home/.aws/amazonq/cli-agents").join(file),
            &config,
        );
    }

    fn write_project(&self, file: &str, config: Value) {
        write(&self.project().join(".amazonq/cli-agents").join(file), &config);
    }
}

fn write(path: &Path, config: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(config).unwrap()).unwrap();
}

fn echo_entry() -> Value {
    json!({"command": "sh", "args": ["-c", ECHO_SCRIPT], "timeout": 5000})
}

#[tokio::test]
async fn loads_http_and_stdio_servers() {
    let stub = StubServer::start(StubBehavior::default()).await;
    let fixture = Fixture::new(3);
    fixture.write_global(
        "default.json",
        json!({
            "name": "default",
            "mcpServers": {
                "remote": {"type": "http", "url": stub.url},
                "local": echo_entry(),
                "off": {"command": "sh", "disabled": true},
                "no-url": {"type": "http"}
            }
        }),
    );

    let loaded = fixture.mcp.load_configurations(Some(fixture.project().as_path())).await;
    assert_eq!(loaded, vec!["local", "remote"]);

    let configured = fixture.mcp.list_configured().await;
    assert_eq!(configured.len(), 2);
    assert_eq!(configured["remote"].transport, TransportKind::Http);
    assert!(!configured["remote"].has_bridge);
    assert_eq!(configured["local"].transport, TransportKind::Stdio);
    assert!(configured["local"].has_bridge);
    assert!(configured["local"].connected);

    let bridge_url = fixture.mcp.bridge_url("local").await.unwrap();
    let client = fixture.mcp.registry().get("local").await.unwrap();
    assert_eq!(client.endpoint(), bridge_url);

    let outcome = fixture
        .mcp
        .registry()
        .execute_tool("local", "echo", json!({"text": "via bridge"}))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.result.unwrap()["arguments"]["text"], "via bridge");

    fixture.mcp.shutdown().await;
}

#[tokio::test]
async fn project_files_override_global_ones() {
    let stub = StubServer::start(StubBehavior::default()).await;
    let fixture = Fixture::new(3);
    fixture.write_global(
        "a.json",
        json!({"name": "global", "mcpServers": {"shared": {"command": "/nonexistent/server"}}}),
    );
    fixture.write_project(
        "b.json",
        json!({"name": "project", "mcpServers": {"shared": {"type": "http", "url": stub.url}}}),
    );

    let loaded = fixture.mcp.load_configurations(Some(fixture.project().as_path())).await;
    assert_eq!(loaded, vec!["shared"]);

    let descriptor = fixture.mcp.get_server_config("shared").await.unwrap();
    assert_eq!(descriptor.kind(), TransportKind::Http);

    let summaries = fixture.mcp.list_configurations(Some(fixture.project().as_path()));
    assert_eq!(summaries.len(), 2);

    fixture.mcp.shutdown().await;
}

#[tokio::test]
async fn spawn_failure_does_not_block_other_servers() {
    let fixture = Fixture::new(3);
    fixture.write_global(
        "default.json",
        json!({
            "name": "default",
            "mcpServers": {
                "broken": {"command": "/nonexistent/mcp-server"},
                "local": echo_entry()
            }
        }),
    );

    let loaded = fixture.mcp.load_configurations(None).await;
    assert_eq!(loaded, vec!["local"]);

    let configured = fixture.mcp.list_configured().await;
    assert!(!configured["broken"].connected);
    assert!(!configured["broken"].has_bridge);

    fixture.mcp.shutdown().await;
}

#[tokio::test]
async fn capacity_limit_leaves_no_bridge_behind() {
    let fixture = Fixture::new(1);
    fixture.write_global(
        "default.json",
        json!({
            "name": "default",
            "mcpServers": {"first": echo_entry(), "second": echo_entry()}
        }),
    );

    let loaded = fixture.mcp.load_configurations(None).await;
    assert_eq!(loaded, vec!["first"]);
    assert_eq!(fixture.mcp.registry().len().await, 1);

    let configured = fixture.mcp.list_configured().await;
    assert!(!configured["second"].has_bridge);
    assert!(fixture.mcp.bridge_url("second").await.is_none());

    fixture.mcp.shutdown().await;
}

#[tokio::test]
async fn reloading_skips_registered_servers() {
    let fixture = Fixture::new(3);
    fixture.write_global(
        "default.json",
        json!({"name": "default", "mcpServers": {"local": echo_entry()}}),
    );

    assert_eq!(fixture.mcp.load_configurations(None).await, vec!["local"]);
    let first_url = fixture.mcp.bridge_url("local").await;

    assert!(fixture.mcp.load_configurations(None).await.is_empty());
    assert_eq!(fixture.mcp.bridge_url("local").await, first_url);

    fixture.mcp.shutdown().await;
}

#[tokio::test]
async fn restart_reprovisions_stdio_server() {
    let fixture = Fixture::new(3);
    fixture.write_global(
        "default.json",
        json!({"name": "default", "mcpServers": {"local": echo_entry()}}),
    );
    fixture.mcp.load_configurations(None).await;

    assert!(fixture.mcp.restart_server("local").await.unwrap());

    let configured = fixture.mcp.list_configured().await;
    assert!(configured["local"].has_bridge);
    assert!(configured["local"].connected);
    let client = fixture.mcp.registry().get("local").await.unwrap();
    assert_eq!(
        Some(client.endpoint().to_string()),
        fixture.mcp.bridge_url("local").await
    );

    assert!(matches!(
        fixture.mcp.restart_server("unknown").await,
        Err(McpError::UnknownServer { .. })
    ));

    fixture.mcp.shutdown().await;
}

#[tokio::test]
async fn remove_forgets_configured_server() {
    let fixture = Fixture::new(3);
    fixture.write_global(
        "default.json",
        json!({"name": "default", "mcpServers": {"local": echo_entry()}}),
    );
    fixture.mcp.load_configurations(None).await;

    fixture.mcp.remove_server("local").await;
    assert!(fixture.mcp.get_server_config("local").await.is_none());
    assert!(fixture.mcp.registry().is_empty().await);
    assert!(fixture.mcp.bridge_url("local").await.is_none());
}

#[tokio::test]
async fn shutdown_is_repeatable_and_safe_when_empty() {
    let fixture = Fixture::new(3);
    fixture.mcp.shutdown().await;

    fixture.write_global(
        "default.json",
        json!({"name": "default", "mcpServers": {"local": echo_entry()}}),
    );
    fixture.mcp.load_configurations(None).await;

    fixture.mcp.shutdown().await;
    fixture.mcp.shutdown().await;
    assert!(fixture.mcp.list_configured().await.is_empty());
    assert!(fixture.mcp.registry().is_empty().await);
}
