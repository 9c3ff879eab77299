//! MCP error types.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(String),

    #[error("MCP request failed: {0}")]
    Service(String),

    #[error("Failed to spawn MCP server '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Invalid MCP header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("MCP connection closed")]
    Closed,

    #[error("MCP tool '{tool}' reported an error: {message}")]
    ToolFailed { tool: String, message: String },
}

impl From<reqwest::Error> for McpError {
    fn from(e: reqwest::Error) -> Self {
        McpError::Transport(e.to_string())
    }
}
