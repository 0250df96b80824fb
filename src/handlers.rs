use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;
use crate::mcp::{ConfiguredMcpManager, ServerDescriptor, ToolOutcome};

/// Shared application state
pub struct AppState {
    pub mcp: Arc<ConfiguredMcpManager>,
    pub project_root: Option<PathBuf>,
}

impl AppState {
    pub fn new(mcp: Arc<ConfiguredMcpManager>, project_root: Option<PathBuf>) -> Arc<Self> {
        Arc::new(Self { mcp, project_root })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/v1/mcp/servers", get(list_servers).post(add_server))
        .route("/v1/mcp/servers/:id", delete(remove_server))
        .route("/v1/mcp/servers/:id/tools/:tool", post(execute_tool))
        .route("/v1/mcp/resources", get(all_resources))
        .route("/v1/mcp/tools", get(all_tools))
        .route("/v1/mcp/health", get(health_check_all))
        .route("/v1/mcp/load", post(load_configurations))
        .route("/v1/mcp/configurations", get(list_configurations))
        .route("/v1/mcp/configured", get(list_configured))
        .route("/v1/mcp/configured/:name", get(get_server_config))
        .route("/v1/mcp/configured/:name/restart", post(restart_server))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.mcp.registry();
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "connections": registry.len().await,
        "max_connections": registry.max_connections(),
    }))
}

pub async fn list_servers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let servers = state.mcp.registry().list().await;
    Json(json!({ "servers": servers, "count": servers.len() }))
}

#[derive(Debug, Deserialize)]
pub struct AddServerRequest {
    pub server_id: String,
    pub endpoint: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

pub async fn add_server(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddServerRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    if request.server_id.trim().is_empty() || request.endpoint.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "server_id and endpoint are required".to_string(),
        ));
    }

    info!("Adding MCP server {}", request.server_id);
    let success = state
        .mcp
        .registry()
        .add_server(&request.server_id, &request.endpoint, &request.name)
        .await;

    let message = if success {
        format!("Server '{}' connected", request.server_id)
    } else {
        format!("Server '{}' could not be added", request.server_id)
    };
    Ok(Json(CommandResponse { success, message }))
}

pub async fn remove_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<CommandResponse> {
    state.mcp.remove_server(&id).await;
    Json(CommandResponse {
        success: true,
        message: format!("Server '{id}' removed"),
    })
}

pub async fn execute_tool(
    State(state): State<Arc<AppState>>,
    Path((id, tool)): Path<(String, String)>,
    arguments: Option<Json<Value>>,
) -> Json<ToolOutcome> {
    let arguments = arguments.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    Json(state.mcp.registry().execute_tool(&id, &tool, arguments).await)
}

pub async fn all_resources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "resources": state.mcp.registry().get_all_resources().await }))
}

pub async fn all_tools(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "tools": state.mcp.registry().get_all_tools().await }))
}

pub async fn health_check_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "servers": state.mcp.registry().health_check_all().await }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadRequest {
    #[serde(default)]
    pub project_root: Option<PathBuf>,
}

pub async fn load_configurations(
    State(state): State<Arc<AppState>>,
    request: Option<Json<LoadRequest>>,
) -> impl IntoResponse {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let root = request.project_root.or_else(|| state.project_root.clone());

    let servers = state.mcp.load_configurations(root.as_deref()).await;
    Json(json!({
        "success": true,
        "message": format!("Loaded {} MCP servers from configuration files", servers.len()),
        "servers": servers,
    }))
}

pub async fn list_configurations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let configurations = state
        .mcp
        .list_configurations(state.project_root.as_deref());
    Json(json!({ "configurations": configurations, "count": configurations.len() }))
}

pub async fn list_configured(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let servers = state.mcp.list_configured().await;
    Json(json!({ "servers": servers, "count": servers.len() }))
}

pub async fn get_server_config(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ServerDescriptor>, ApiError> {
    state
        .mcp
        .get_server_config(&name)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Server '{name}' not found")))
}

pub async fn restart_server(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    info!("Restarting MCP server {}", name);
    let success = state.mcp.restart_server(&name).await?;

    let message = if success {
        format!("Server '{name}' restarted successfully")
    } else {
        "Failed to reconnect".to_string()
    };
    Ok(Json(CommandResponse { success, message }))
}
