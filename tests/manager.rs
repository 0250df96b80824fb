mod common;

use common::{StubBehavior, StubServer};
use mcp_connector::mcp::{ManagerOptions, McpManager};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn manager(max_connections: usize) -> McpManager {
    McpManager::new(ManagerOptions {
        max_connections,
        request_timeout: Duration::from_secs(5),
        ..ManagerOptions::default()
    })
}

#[tokio::test]
async fn concurrent_adds_never_exceed_capacity() {
    let stub = StubServer::start(StubBehavior {
        delay: Duration::from_millis(100),
        ..StubBehavior::default()
    })
    .await;
    let manager = Arc::new(manager(3));

    let attempts = (0..5).map(|i| {
        let manager = manager.clone();
        let url = stub.url.clone();
        tokio::spawn(async move { manager.add_server(&format!("s{i}"), &url, "").await })
    });
    let results = futures::future::join_all(attempts).await;

    let accepted = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(accepted, 3);
    assert_eq!(manager.len().await, 3);
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let stub = StubServer::start(StubBehavior::default()).await;
    let manager = manager(3);

    assert!(manager.add_server("a", &stub.url, "A").await);
    assert!(!manager.add_server("a", &stub.url, "A again").await);
    assert_eq!(manager.len().await, 1);
    assert_eq!(manager.get("a").await.unwrap().name(), "A");
}

#[tokio::test]
async fn unreachable_server_is_not_registered() {
    let manager = McpManager::new(ManagerOptions {
        request_timeout: Duration::from_millis(500),
        ..ManagerOptions::default()
    });

    assert!(!manager.add_server("dead", "http://127.0.0.1:9", "").await);
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn list_reports_status_per_server() {
    let stub = StubServer::start(StubBehavior::default()).await;
    let manager = manager(3);
    assert!(manager.add_server("a", &stub.url, "").await);

    let statuses = manager.list().await;
    let status = &statuses["a"];
    assert_eq!(status.name, "a");
    assert_eq!(status.endpoint, stub.url);
    assert!(status.connected);
    assert_eq!(status.capabilities["tools"], json!({}));
}

#[tokio::test]
async fn execute_tool_on_unknown_server() {
    let outcome = manager(3).execute_tool("missing", "echo", json!({})).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Server not found"));
}

#[tokio::test]
async fn execute_tool_reports_result_and_failure() {
    let ok = StubServer::start(StubBehavior::default()).await;
    let failing = StubServer::start(StubBehavior {
        rpc_errors: vec!["tools/call"],
        ..StubBehavior::default()
    })
    .await;
    let manager = manager(3);
    assert!(manager.add_server("ok", &ok.url, "").await);
    assert!(manager.add_server("failing", &failing.url, "").await);

    let outcome = manager.execute_tool("ok", "echo", json!({"n": 1})).await;
    assert!(outcome.success);
    assert_eq!(outcome.result.unwrap()["content"][0]["text"], r#"{"n":1}"#);

    let outcome = manager.execute_tool("failing", "echo", json!({})).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("Method not found"));
}

#[tokio::test]
async fn aggregation_skips_failing_servers() {
    let good = StubServer::start(StubBehavior::default()).await;
    let bad = StubServer::start(StubBehavior {
        rpc_errors: vec!["resources/list", "tools/list"],
        ..StubBehavior::default()
    })
    .await;
    let manager = manager(3);
    assert!(manager.add_server("good", &good.url, "").await);
    assert!(manager.add_server("bad", &bad.url, "").await);

    let resources = manager.get_all_resources().await;
    assert_eq!(resources.len(), 1);
    assert_eq!(resources["good"][0].uri, "file:///notes.txt");

    let tools = manager.get_all_tools().await;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools["good"][0].name, "echo");
}

#[tokio::test]
async fn health_check_all_reports_each_server() {
    let alive = StubServer::start(StubBehavior::default()).await;
    let broken = StubServer::start(StubBehavior {
        http_errors: vec!["ping"],
        ..StubBehavior::default()
    })
    .await;
    let manager = manager(3);
    assert!(manager.add_server("alive", &alive.url, "").await);
    assert!(manager.add_server("broken", &broken.url, "").await);

    let health = manager.health_check_all().await;
    assert_eq!(health["alive"], true);
    assert_eq!(health["broken"], false);

    let statuses = manager.list().await;
    assert!(statuses["alive"].last_health_check.is_some());
    assert!(!statuses["broken"].connected);
}

#[tokio::test]
async fn remove_frees_capacity() {
    let stub = StubServer::start(StubBehavior::default()).await;
    let manager = manager(1);

    assert!(manager.add_server("a", &stub.url, "").await);
    assert!(!manager.add_server("b", &stub.url, "").await);

    manager.remove_server("a").await;
    manager.remove_server("never-added").await;
    assert!(manager.add_server("b", &stub.url, "").await);
}

#[tokio::test]
async fn shutdown_is_repeatable() {
    let stub = StubServer::start(StubBehavior::default()).await;
    let manager = manager(3);
    assert!(manager.add_server("a", &stub.url, "").await);
    let client = manager.get("a").await.unwrap();

    manager.shutdown().await;
    assert!(manager.is_empty().await);
    assert!(!client.is_connected());

    manager.shutdown().await;
    assert!(manager.list().await.is_empty());
}
