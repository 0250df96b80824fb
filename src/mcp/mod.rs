mod bridge;
mod client;
mod configured;
mod error;
mod loader;
mod manager;
mod protocol;
mod types;

pub use bridge::StdioBridge;
pub use client::{ClientOptions, McpClient};
pub use configured::ConfiguredMcpManager;
pub use error::McpError;
pub use loader::{AgentConfig, ConfigLoader, ConfigurationSummary};
pub use manager::{ManagerOptions, McpManager, DEFAULT_MAX_CONNECTIONS};
pub use protocol::{INTERNAL_ERROR, REQUEST_TIMEOUT};
pub use types::{
    ConfiguredServerInfo, McpPrompt, McpResource, McpTool, OAuthSettings, ServerDescriptor,
    ServerStatus, ToolOutcome, Transport, TransportKind,
};
