use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::mcp::client::{ClientOptions, McpClient, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RESPONSE_LIMIT};
use crate::mcp::types::{McpResource, McpTool, ServerStatus, ToolOutcome};

pub const DEFAULT_MAX_CONNECTIONS: usize = 3;

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub max_connections: usize,
    pub request_timeout: Duration,
    pub max_response_bytes: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_response_bytes: DEFAULT_RESPONSE_LIMIT,
        }
    }
}

/// Registry of live MCP connections keyed by server id.
///
/// Mutations (`add_server`, `remove_server`, `shutdown`) run one at a time
/// under `admission`, so the capacity check and the insert act as a single
/// step. Queries work on a snapshot of the map and never wait on a
/// connecting server.
pub struct McpManager {
    clients: RwLock<HashMap<String, Arc<McpClient>>>,
    admission: Mutex<()>,
    options: ManagerOptions,
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new(ManagerOptions::default())
    }
}

impl McpManager {
    pub fn new(options: ManagerOptions) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            admission: Mutex::new(()),
            options,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.options.max_connections
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    pub async fn contains(&self, server_id: &str) -> bool {
        self.clients.read().await.contains_key(server_id)
    }

    pub async fn get(&self, server_id: &str) -> Option<Arc<McpClient>> {
        self.clients.read().await.get(server_id).cloned()
    }

    pub async fn add_server(&self, server_id: &str, endpoint: &str, name: &str) -> bool {
        self.add_server_with_headers(server_id, endpoint, name, HashMap::new())
            .await
    }

    /// Connects and registers a server. `false` (logged) on duplicate id,
    /// full capacity, or failed handshake; nothing is registered then.
    pub async fn add_server_with_headers(
        &self,
        server_id: &str,
        endpoint: &str,
        name: &str,
        headers: HashMap<String, String>,
    ) -> bool {
        let _admission = self.admission.lock().await;

        {
            let clients = self.clients.read().await;
            if clients.contains_key(server_id) {
                warn!("MCP server {} already exists", server_id);
                return false;
            }
            if clients.len() >= self.options.max_connections {
                warn!(
                    "Maximum MCP connections ({}) reached, rejecting {}",
                    self.options.max_connections, server_id
                );
                return false;
            }
        }

        let client = McpClient::new(
            server_id,
            endpoint,
            name,
            ClientOptions {
                timeout: self.options.request_timeout,
                max_response_bytes: self.options.max_response_bytes,
                headers,
            },
        );

        if !client.connect().await {
            return false;
        }

        self.clients
            .write()
            .await
            .insert(server_id.to_string(), Arc::new(client));
        info!("Registered MCP server {} at {}", server_id, endpoint);
        true
    }

    /// Disconnects and forgets a server. Unknown ids are ignored.
    pub async fn remove_server(&self, server_id: &str) {
        let _admission = self.admission.lock().await;

        let removed = self.clients.write().await.remove(server_id);
        if let Some(client) = removed {
            client.disconnect().await;
            info!("Removed MCP server {}", server_id);
        }
    }

    pub async fn list(&self) -> HashMap<String, ServerStatus> {
        let statuses = join_all(self.snapshot().await.into_iter().map(|client| async move {
            (client.server_id().to_string(), client.status().await)
        }))
        .await;

        statuses.into_iter().collect()
    }

    /// Resources per connected server; a server whose query fails is left out.
    pub async fn get_all_resources(&self) -> HashMap<String, Vec<McpResource>> {
        let connected = self.snapshot().await.into_iter().filter(|c| c.is_connected());

        let results = join_all(connected.map(|client| async move {
            let resources = client.try_list_resources().await;
            (client, resources)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(client, resources)| match resources {
                Ok(resources) => Some((client.server_id().to_string(), resources)),
                Err(e) => {
                    warn!("Skipping resources from {}: {}", client.server_id(), e);
                    None
                }
            })
            .collect()
    }

    pub async fn get_all_tools(&self) -> HashMap<String, Vec<McpTool>> {
        let connected = self.snapshot().await.into_iter().filter(|c| c.is_connected());

        let results = join_all(connected.map(|client| async move {
            let tools = client.try_list_tools().await;
            (client, tools)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(client, tools)| match tools {
                Ok(tools) => Some((client.server_id().to_string(), tools)),
                Err(e) => {
                    warn!("Skipping tools from {}: {}", client.server_id(), e);
                    None
                }
            })
            .collect()
    }

    pub async fn execute_tool(&self, server_id: &str, tool_name: &str, arguments: Value) -> ToolOutcome {
        let Some(client) = self.get(server_id).await else {
            return ToolOutcome::failed("Server not found");
        };

        // try_call_tool reconnects first when the client is down
        match client.try_call_tool(tool_name, arguments).await {
            Ok(result) => ToolOutcome::ok(result),
            Err(e) => {
                warn!("Tool {} on {} failed: {}", tool_name, server_id, e);
                ToolOutcome::failed(e.to_string())
            }
        }
    }

    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let checks = join_all(self.snapshot().await.into_iter().map(|client| async move {
            (client.server_id().to_string(), client.health_check().await)
        }))
        .await;

        checks.into_iter().collect()
    }

    /// Disconnects every client and empties the registry.
    pub async fn shutdown(&self) {
        let _admission = self.admission.lock().await;

        let drained: Vec<_> = self.clients.write().await.drain().map(|(_, c)| c).collect();
        for client in &drained {
            client.disconnect().await;
        }
        if !drained.is_empty() {
            info!("Shut down {} MCP connections", drained.len());
        }
    }

    async fn snapshot(&self) -> Vec<Arc<McpClient>> {
        self.clients.read().await.values().cloned().collect()
    }
}
