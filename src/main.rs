use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mcp_connector::config::Config;
use mcp_connector::handlers::{router, AppState};
use mcp_connector::mcp::{ConfigLoader, ConfiguredMcpManager, McpManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcp_connector=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    info!("Starting MCP connector");
    info!(
        "Connection limit: {}, request timeout: {:?}",
        config.max_connections, config.request_timeout
    );

    let registry = Arc::new(McpManager::new(config.manager_options()));
    let mcp = Arc::new(ConfiguredMcpManager::new(registry, ConfigLoader::new()));

    if config.auto_load {
        let loaded = mcp.load_configurations(config.project_root.as_deref()).await;
        if loaded.is_empty() {
            warn!("No MCP servers loaded. Create a config in .amazonq/cli-agents/");
        } else {
            info!("Loaded {} MCP servers: {:?}", loaded.len(), loaded);
        }
    }

    let app = router(AppState::new(mcp.clone(), config.project_root.clone()));

    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await;

    mcp.shutdown().await;
    served?;

    Ok(())
}
