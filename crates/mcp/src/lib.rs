//! Model Context Protocol support for agentloom.
//!
//! Connects to remote tool servers over streamable HTTP or stdio through
//! `rmcp`, discovers their tools and registers them as `service@tool`
//! proxies in a [`ToolRegistry`](agentloom_core::ToolRegistry).

pub mod adapter;
pub mod client;
pub mod error;

pub use adapter::{McpAdapter, McpToolProxy};
pub use client::{McpClient, McpSession, RemoteTool};
pub use error::McpError;
