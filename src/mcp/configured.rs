use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::mcp::bridge::StdioBridge;
use crate::mcp::error::McpError;
use crate::mcp::loader::{ConfigLoader, ConfigurationSummary};
use crate::mcp::manager::McpManager;
use crate::mcp::types::{ConfiguredServerInfo, ServerDescriptor, Transport};

#[derive(Default)]
struct Provisioned {
    descriptors: HashMap<String, ServerDescriptor>,
    bridges: HashMap<String, StdioBridge>,
}

/// Loads servers from configuration files on top of a shared [`McpManager`].
///
/// HTTP descriptors are registered directly; stdio descriptors get a
/// [`StdioBridge`] first and are registered under the bridge URL.
pub struct ConfiguredMcpManager {
    registry: Arc<McpManager>,
    loader: ConfigLoader,
    state: Mutex<Provisioned>,
}

impl ConfiguredMcpManager {
    pub fn new(registry: Arc<McpManager>, loader: ConfigLoader) -> Self {
        Self {
            registry,
            loader,
            state: Mutex::new(Provisioned::default()),
        }
    }

    pub fn registry(&self) -> &Arc<McpManager> {
        &self.registry
    }

    pub fn loader(&self) -> &ConfigLoader {
        &self.loader
    }

    pub fn list_configurations(&self, project_root: Option<&Path>) -> Vec<ConfigurationSummary> {
        self.loader.list_configurations(project_root)
    }

    /// Discovers, parses and provisions every configured server. Returns the
    /// names that ended up registered; failures are logged per server.
    pub async fn load_configurations(&self, project_root: Option<&Path>) -> Vec<String> {
        let discovered = self.loader.collect_descriptors(project_root);
        info!("Found {} MCP server definitions", discovered.len());

        let mut state = self.state.lock().await;
        let mut loaded = Vec::new();

        for (name, (file, descriptor)) in discovered {
            if self.registry.contains(&name).await {
                info!("MCP server '{}' already loaded, skipping", name);
                continue;
            }

            match self.provision(&mut state, descriptor).await {
                Ok(true) => {
                    info!("Loaded MCP server '{}' from {}", name, file.display());
                    loaded.push(name);
                }
                Ok(false) => warn!("MCP server '{}' from {} was not registered", name, file.display()),
                Err(e) => error!("Failed to load MCP server '{}': {}", name, e),
            }
        }

        loaded
    }

    /// Stops and re-provisions one configured server.
    pub async fn restart_server(&self, name: &str) -> Result<bool, McpError> {
        let mut state = self.state.lock().await;

        let descriptor = state
            .descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::UnknownServer {
                name: name.to_string(),
            })?;

        if let Some(mut bridge) = state.bridges.remove(name) {
            bridge.stop().await;
        }
        self.registry.remove_server(name).await;

        let added = self.provision(&mut state, descriptor).await?;
        info!(
            "Restarted MCP server '{}': {}",
            name,
            if added { "reconnected" } else { "failed to reconnect" }
        );
        Ok(added)
    }

    /// Removes a server's connection, bridge and descriptor.
    pub async fn remove_server(&self, name: &str) {
        let mut state = self.state.lock().await;

        if let Some(mut bridge) = state.bridges.remove(name) {
            bridge.stop().await;
        }
        state.descriptors.remove(name);
        self.registry.remove_server(name).await;
    }

    pub async fn get_server_config(&self, name: &str) -> Option<ServerDescriptor> {
        self.state.lock().await.descriptors.get(name).cloned()
    }

    pub async fn list_configured(&self) -> BTreeMap<String, ConfiguredServerInfo> {
        let state = self.state.lock().await;
        let mut servers = BTreeMap::new();

        for (name, descriptor) in &state.descriptors {
            let (command, url) = match &descriptor.transport {
                Transport::Stdio { command, .. } => (Some(command.clone()), None),
                Transport::Http { url, .. } => (None, Some(url.clone())),
            };
            let connected = self
                .registry
                .get(name)
                .await
                .is_some_and(|client| client.is_connected());

            servers.insert(
                name.clone(),
                ConfiguredServerInfo {
                    transport: descriptor.kind(),
                    command,
                    url,
                    connected,
                    has_bridge: state.bridges.contains_key(name),
                },
            );
        }

        servers
    }

    pub async fn bridge_url(&self, name: &str) -> Option<String> {
        self.state.lock().await.bridges.get(name).and_then(StdioBridge::url)
    }

    /// Stops every bridge, then shuts the registry down.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;

        for (name, mut bridge) in state.bridges.drain() {
            bridge.stop().await;
            info!("Stopped bridge for {}", name);
        }
        state.descriptors.clear();
        drop(state);

        self.registry.shutdown().await;
    }

    /// Registers one descriptor. Bridge start failures are returned as errors;
    /// a rejected registration is `Ok(false)` and leaves no bridge behind.
    async fn provision(
        &self,
        state: &mut Provisioned,
        descriptor: ServerDescriptor,
    ) -> Result<bool, McpError> {
        let name = descriptor.name.clone();
        state.descriptors.insert(name.clone(), descriptor.clone());

        if self.registry.len().await >= self.registry.max_connections() {
            warn!(
                "Maximum MCP connections ({}) reached, not provisioning {}",
                self.registry.max_connections(),
                name
            );
            return Ok(false);
        }

        match &descriptor.transport {
            Transport::Http { url, headers, .. } => Ok(self
                .registry
                .add_server_with_headers(&name, url, &name, headers.clone())
                .await),
            Transport::Stdio { .. } => {
                let mut bridge = StdioBridge::new(descriptor);
                let endpoint = bridge.start().await?;

                if self.registry.add_server(&name, &endpoint, &name).await {
                    state.bridges.insert(name, bridge);
                    Ok(true)
                } else {
                    bridge.stop().await;
                    Ok(false)
                }
            }
        }
    }
}
