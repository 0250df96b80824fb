use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::mcp::{ManagerOptions, DEFAULT_MAX_CONNECTIONS};

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub max_connections: usize,
    pub request_timeout: Duration,
    pub response_limit_bytes: usize,
    pub project_root: Option<PathBuf>,
    pub auto_load: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unparseable values fall back to defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server_host: lookup("MCP_SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: parsed(&lookup, "MCP_SERVER_PORT").unwrap_or(8765),
            max_connections: parsed(&lookup, "MAX_MCP_CONNECTIONS").unwrap_or(DEFAULT_MAX_CONNECTIONS),
            request_timeout: Duration::from_secs(parsed(&lookup, "MCP_TIMEOUT_SECONDS").unwrap_or(30)),
            response_limit_bytes: parsed::<usize>(&lookup, "MCP_RESPONSE_SIZE_LIMIT_MB")
                .unwrap_or(10)
                .saturating_mul(1024 * 1024),
            project_root: lookup("MCP_PROJECT_ROOT")
                .map(PathBuf::from)
                .or_else(|| env::current_dir().ok()),
            auto_load: parsed(&lookup, "MCP_AUTO_LOAD").unwrap_or(true),
        }
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            max_connections: self.max_connections,
            request_timeout: self.request_timeout,
            max_response_bytes: self.response_limit_bytes,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
