pub mod config; // Configuration from environment variables
pub mod error; // HTTP-facing errors
pub mod handlers; // Admin HTTP endpoints over the manager
pub mod mcp; // Config loading, protocol client, stdio bridge, connection managers
