//! Discovery and parsing of agent configuration files.
//!
//! Files follow the Amazon Q agent layout: one JSON object per file with a
//! required `name` and an `mcpServers` table. Global files live under
//! `~/.aws/amazonq/`, project files under `<root>/.amazonq/`.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

use crate::mcp::types::{RawServerEntry, ServerDescriptor};

const GLOBAL_CLI_DIR: &str = ".aws/amazonq/cli-agents";
const GLOBAL_IDE_DIR: &str = ".aws/amazonq/agents";
const PROJECT_CLI_DIR: &str = ".amazonq/cli-agents";
const PROJECT_IDE_DIR: &str = ".amazonq/agents";
const GLOBAL_LEGACY_FILE: &str = ".aws/amazonq/mcp.json";
const PROJECT_LEGACY_FILE: &str = ".amazonq/mcp.json";

/// A parsed configuration file that passed top-level validation.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub description: Option<String>,
    pub mcp_servers: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationSummary {
    pub file: PathBuf,
    pub name: String,
    pub description: Option<String>,
    pub servers: Vec<String>,
    pub scope: &'static str,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    home: Option<PathBuf>,
    cwd: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            home: dirs::home_dir(),
            cwd: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Loader rooted at explicit directories instead of `$HOME` and the cwd.
    pub fn with_roots(home: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            cwd: cwd.into(),
        }
    }

    /// Returns every candidate `*.json` file, deduplicated by resolved path.
    pub fn find_config_files(&self, project_root: Option<&Path>) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        let mut legacy = Vec::new();

        if let Some(home) = &self.home {
            dirs.push(home.join(GLOBAL_CLI_DIR));
            dirs.push(home.join(GLOBAL_IDE_DIR));
            legacy.push(home.join(GLOBAL_LEGACY_FILE));
        }
        if let Some(root) = project_root {
            dirs.push(root.join(PROJECT_CLI_DIR));
            dirs.push(root.join(PROJECT_IDE_DIR));
        }
        legacy.push(self.cwd.join(PROJECT_LEGACY_FILE));

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let mut push = |path: PathBuf| {
            let resolved = path.canonicalize().unwrap_or_else(|_| path.clone());
            if seen.insert(resolved) {
                files.push(path);
            }
        };

        for dir in dirs {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            let mut found: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && is_json(path))
                .collect();
            found.sort();
            found.into_iter().for_each(&mut push);
        }

        for path in legacy {
            if path.is_file() && is_json(&path) {
                push(path);
            }
        }

        debug!("Found {} configuration files", files.len());
        files
    }

    /// Reads one file; `None` (logged) when it is unreadable, malformed, or
    /// lacks a non-empty top-level `name`.
    pub fn load_configuration(path: &Path) -> Option<AgentConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read configuration {}: {}", path.display(), e);
                return None;
            }
        };

        let value: Value = match serde_json::from_str(&expand_env_vars(&content)) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse configuration {}: {}", path.display(), e);
                return None;
            }
        };

        let Some(object) = value.as_object() else {
            warn!("Configuration {} is not a JSON object", path.display());
            return None;
        };

        let name = match object.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                warn!("Configuration {} missing 'name' field", path.display());
                return None;
            }
        };

        let mcp_servers = match object.get("mcpServers") {
            Some(Value::Object(servers)) => servers.clone(),
            Some(_) => {
                warn!("Configuration {}: 'mcpServers' is not an object", path.display());
                Map::new()
            }
            None => Map::new(),
        };

        Some(AgentConfig {
            name,
            description: object
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            mcp_servers,
        })
    }

    /// Parses each `mcpServers` entry independently; bad entries are skipped.
    pub fn extract_mcp_servers(config: &AgentConfig) -> BTreeMap<String, ServerDescriptor> {
        let mut servers = BTreeMap::new();

        for (name, raw) in &config.mcp_servers {
            let entry: RawServerEntry = match serde_json::from_value(raw.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Failed to parse MCP server '{}' in '{}': {}", name, config.name, e);
                    continue;
                }
            };

            if entry.disabled {
                info!("Skipping disabled MCP server: {}", name);
                continue;
            }

            match ServerDescriptor::from_entry(name, entry) {
                Ok(descriptor) => {
                    servers.insert(name.clone(), descriptor);
                }
                Err(e) => error!("Failed to parse MCP server '{}': {}", name, e),
            }
        }

        servers
    }

    /// Loads every discovered file and merges the descriptors, later files
    /// overwriting earlier entries of the same name.
    pub fn collect_descriptors(
        &self,
        project_root: Option<&Path>,
    ) -> BTreeMap<String, (PathBuf, ServerDescriptor)> {
        let mut merged = BTreeMap::new();

        for file in self.find_config_files(project_root) {
            let Some(config) = Self::load_configuration(&file) else {
                continue;
            };
            for (name, descriptor) in Self::extract_mcp_servers(&config) {
                if merged.contains_key(&name) {
                    debug!("MCP server '{}' redefined by {}", name, file.display());
                }
                merged.insert(name, (file.clone(), descriptor));
            }
        }

        merged
    }

    pub fn list_configurations(&self, project_root: Option<&Path>) -> Vec<ConfigurationSummary> {
        let global_root = self.home.as_ref().map(|home| home.join(".aws"));

        self.find_config_files(project_root)
            .into_iter()
            .filter_map(|file| {
                let config = Self::load_configuration(&file)?;
                let servers = Self::extract_mcp_servers(&config).into_keys().collect();
                let scope = match &global_root {
                    Some(root) if file.starts_with(root) => "global",
                    _ => "project",
                };
                Some(ConfigurationSummary {
                    file,
                    name: config.name,
                    description: config.description,
                    servers,
                    scope,
                })
            })
            .collect()
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("json")
}

/// Replaces `${NAME}` with the environment value, or nothing when unset.
fn expand_env_vars(content: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"\$\{(\w+)\}").expect("static pattern"));

    re.replace_all(content, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}
