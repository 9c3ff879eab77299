//! Remote-tool adapter: exposes an MCP server's tools through the local
//! [`ToolRegistry`] under the `service@tool` namespace.

use agentloom_config::{McpServiceConfig, McpTransportKind};
use agentloom_core::error::ToolError;
use agentloom_core::tool::{Tool, ToolContext, ToolKind, ToolRegistry, qualified_name};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::{McpClient, McpSession, RemoteTool, input_to_arguments, result_text};
use crate::error::McpError;

/// A live connection to one named remote service.
pub struct McpAdapter {
    service: String,
    session: Arc<dyn McpSession>,
}

impl McpAdapter {
    /// Open the configured transport and complete the handshake.
    pub async fn connect(service: &str, config: &McpServiceConfig) -> Result<Self, McpError> {
        let client = match config.transport {
            McpTransportKind::Http => McpClient::http(&config.endpoint, &config.headers).await?,
            McpTransportKind::Stdio => McpClient::stdio(&config.endpoint, &config.args, &config.env).await?,
        };
        Ok(Self::with_session(service, Arc::new(client)))
    }

    /// Wrap an already-initialised session.
    pub fn with_session(service: &str, session: Arc<dyn McpSession>) -> Self {
        Self {
            service: service.to_string(),
            session,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Fetch the remote tool list and register a proxy for each tool.
    ///
    /// Entries from an earlier discovery of the same service are replaced.
    /// When listing fails nothing in `registry` is touched.
    pub async fn discover(&self, registry: &mut ToolRegistry) -> Result<usize, McpError> {
        let tools = self.session.list_tools().await?;
        let removed = registry.remove_service(&self.service);

        let count = tools.len();
        for remote in tools {
            registry.register(Arc::new(McpToolProxy::new(
                &self.service,
                remote,
                self.session.clone(),
            )));
        }

        info!(service = %self.service, tools = count, replaced = removed, "Discovered remote tools");
        Ok(count)
    }

    pub async fn close(&self) {
        if let Err(e) = self.session.close().await {
            warn!(service = %self.service, error = %e, "Failed to close MCP connection");
        }
    }
}

/// A registry entry forwarding calls to one remote tool.
pub struct McpToolProxy {
    name: String,
    remote: String,
    description: String,
    schema: Option<serde_json::Value>,
    session: Arc<dyn McpSession>,
}

impl McpToolProxy {
    pub fn new(service: &str, remote: RemoteTool, session: Arc<dyn McpSession>) -> Self {
        Self {
            name: qualified_name(service, &remote.name),
            remote: remote.name,
            description: remote.description.unwrap_or_default(),
            schema: remote.input_schema,
            session,
        }
    }

    async fn call(&self, input: &str) -> Result<String, McpError> {
        let result = self.session.call_tool(&self.remote, input_to_arguments(input)).await?;
        let text = result_text(&result);
        if result.is_error.unwrap_or(false) {
            return Err(McpError::ToolFailed {
                tool: self.remote.clone(),
                message: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl Tool for McpToolProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Option<serde_json::Value> {
        self.schema.clone()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Remote
    }

    async fn execute(&self, ctx: &ToolContext, input: &str) -> Result<String, ToolError> {
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(ToolError::Cancelled(self.name.clone())),
            result = self.call(input) => result,
        };
        result.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: e.to_string(),
        })
    }
}
