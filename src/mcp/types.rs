use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::mcp::error::McpError;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// One `mcpServers` entry as written in a configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServerEntry {
    #[serde(rename = "type", default)]
    pub transport_type: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub oauth_client_id: Option<String>,
    #[serde(default)]
    pub oauth_client_secret: Option<String>,
    #[serde(default)]
    pub oauth_redirect_uri: Option<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OAuthSettings {
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

impl OAuthSettings {
    fn from_entry(entry: &RawServerEntry) -> Option<Self> {
        let settings = Self {
            client_id: entry.oauth_client_id.clone(),
            client_secret: entry.oauth_client_secret.clone(),
            redirect_uri: entry.oauth_redirect_uri.clone(),
        };
        (settings != Self::default()).then_some(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum Transport {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        headers: HashMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        oauth: Option<OAuthSettings>,
    },
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Http { .. } => TransportKind::Http,
        }
    }
}

/// Normalized connection settings for one configured server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub transport: Transport,
    pub timeout_ms: u64,
}

impl ServerDescriptor {
    /// Transport is HTTP iff `type` is exactly `"http"`; anything else is stdio.
    pub fn from_entry(name: &str, entry: RawServerEntry) -> Result<Self, McpError> {
        let invalid = |reason: &str| McpError::InvalidDescriptor {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let transport = if entry.transport_type.as_deref() == Some("http") {
            let oauth = OAuthSettings::from_entry(&entry);
            let url = entry
                .url
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| invalid("HTTP transport requires 'url'"))?;
            Transport::Http {
                url,
                headers: entry.headers,
                oauth,
            }
        } else {
            let command = entry
                .command
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| invalid("stdio transport requires 'command'"))?;
            Transport::Stdio {
                command,
                args: entry.args,
                env: entry.env,
            }
        };

        Ok(Self {
            name: name.to_string(),
            transport,
            timeout_ms: entry.timeout,
        })
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResource {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPrompt {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

/// Snapshot of one registered connection.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub server_id: String,
    pub name: String,
    pub endpoint: String,
    pub connected: bool,
    pub capabilities: Value,
    pub last_health_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfiguredServerInfo {
    pub transport: TransportKind,
    pub command: Option<String>,
    pub url: Option<String>,
    pub connected: bool,
    pub has_bridge: bool,
}

/// Outcome of `execute_tool`, shaped for the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}
