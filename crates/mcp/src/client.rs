//! MCP sessions built on `rmcp`: handshake, tool discovery and tool
//! invocation over a child process or streamable HTTP.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::ServiceExt;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, Implementation, JsonObject, Tool,
};
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::McpError;

/// A tool as advertised by a remote server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

impl RemoteTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

impl From<Tool> for RemoteTool {
    fn from(tool: Tool) -> Self {
        let schema = tool.input_schema.as_ref().clone();
        Self {
            name: tool.name.to_string(),
            description: tool.description.map(|d| d.to_string()),
            input_schema: (!schema.is_empty()).then_some(Value::Object(schema)),
        }
    }
}

/// The operations the adapter needs from one open session.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Every tool the server advertises.
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, McpError>;

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult, McpError>;

    async fn close(&self) -> Result<(), McpError>;
}

/// A live `rmcp` client session.
pub struct McpClient {
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ClientInfo>>>,
}

fn client_info() -> ClientInfo {
    ClientInfo {
        meta: None,
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "agentloom".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: None,
            website_url: None,
        },
    }
}

impl McpClient {
    /// Spawn `program` and complete the handshake over its stdio.
    pub async fn stdio(program: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self, McpError> {
        let mut cmd = Command::new(program);
        cmd.args(args).envs(env);
        let transport = TokioChildProcess::new(cmd).map_err(|e| McpError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        let service = client_info()
            .serve(transport)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        Ok(Self::from_service(service))
    }

    /// Connect to a streamable-HTTP endpoint, sending `headers` on every request.
    pub async fn http(endpoint: &str, headers: &HashMap<String, String>) -> Result<Self, McpError> {
        let client = reqwest::Client::builder()
            .default_headers(header_map(headers)?)
            .build()?;
        let transport = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(endpoint.to_string()),
        );

        let service = client_info()
            .serve(transport)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        Ok(Self::from_service(service))
    }

    fn from_service(service: RunningService<RoleClient, ClientInfo>) -> Self {
        if let Some(server) = service.peer().peer_info() {
            info!(
                server = %server.server_info.name,
                version = %server.server_info.version,
                "MCP session initialised"
            );
        }
        Self {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }
}

#[async_trait]
impl McpSession for McpClient {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, McpError> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| McpError::Service(e.to_string()))?;
        Ok(tools.into_iter().map(RemoteTool::from).collect())
    }

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult, McpError> {
        debug!(tool = name, "MCP tools/call");
        let params = CallToolRequestParams {
            name: name.to_string().into(),
            arguments: Some(arguments),
            meta: None,
            task: None,
        };
        self.peer
            .call_tool(params)
            .await
            .map_err(|e| McpError::Service(e.to_string()))
    }

    async fn close(&self) -> Result<(), McpError> {
        let service = self.service.lock().map_err(|_| McpError::Closed)?.take();
        match service {
            Some(service) => service
                .cancel()
                .await
                .map(|_| ())
                .map_err(|e| McpError::Transport(e.to_string())),
            None => Ok(()),
        }
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, McpError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let invalid = |reason: String| McpError::InvalidHeader {
            name: name.clone(),
            reason,
        };
        let key = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Tool input as MCP arguments: a JSON object passes through, anything else
/// is wrapped as `{"input": text}`.
pub fn input_to_arguments(input: &str) -> JsonObject {
    match serde_json::from_str::<Value>(input.trim()) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = JsonObject::new();
            map.insert("input".into(), json!(input));
            map
        }
    }
}

/// Concatenate the textual parts of a tool result.
pub fn result_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|content| {
            let value = serde_json::to_value(content).ok()?;
            value.get("text").and_then(Value::as_str).map(str::to_string)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;
    use std::sync::Arc;

    #[test]
    fn object_input_passes_through() {
        let args = input_to_arguments(r#" {"host": "a"} "#);
        assert_eq!(Value::Object(args), json!({"host": "a"}));
    }

    #[test]
    fn other_input_is_wrapped() {
        assert_eq!(Value::Object(input_to_arguments("example.com")), json!({"input": "example.com"}));
        assert_eq!(Value::Object(input_to_arguments("[1,2]")), json!({"input": "[1,2]"}));
        assert_eq!(Value::Object(input_to_arguments("")), json!({"input": ""}));
    }

    #[test]
    fn text_parts_are_joined() {
        let result = CallToolResult::success(vec![Content::text("pong"), Content::text("rtt=3ms")]);
        assert_eq!(result_text(&result), "pong\nrtt=3ms");
        assert_eq!(result_text(&CallToolResult::success(vec![])), "");
    }

    #[test]
    fn advertised_tool_keeps_schema() {
        let schema = json!({"type": "object", "properties": {"host": {"type": "string"}}});
        let Value::Object(schema_map) = schema.clone() else {
            unreachable!()
        };
        let tool = Tool::new("ping", "Ping a host", Arc::new(schema_map));
        let remote = RemoteTool::from(tool);
        assert_eq!(remote.name, "ping");
        assert_eq!(remote.description.as_deref(), Some("Ping a host"));
        assert_eq!(remote.input_schema, Some(schema));
    }

    #[test]
    fn invalid_header_is_reported() {
        let headers = HashMap::from([("bad header".to_string(), "x".to_string())]);
        let err = header_map(&headers).unwrap_err();
        assert!(matches!(err, McpError::InvalidHeader { name, .. } if name == "bad header"));

        let headers = HashMap::from([("Authorization".to_string(), "Bearer t".to_string())]);
        assert_eq!(header_map(&headers).unwrap()["authorization"], "Bearer t");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let err = McpClient::stdio("agentloom-no-such-mcp-server", &[], &HashMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, McpError::Spawn { program, .. } if program == "agentloom-no-such-mcp-server"));
    }
}
