//! Remote tool discovery and dispatch against an in-memory MCP session.

use agentloom_config::{McpServiceConfig, McpTransportKind};
use agentloom_core::FnTool;
use agentloom_core::error::ToolError;
use agentloom_core::tool::{ToolCall, ToolContext, ToolKind, ToolRegistry};
use agentloom_mcp::{McpAdapter, McpError, McpSession, RemoteTool};
use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A scripted server session.
struct FakeServer {
    tools: Vec<RemoteTool>,
    calls: Mutex<Vec<(String, Value)>>,
    fail_listing: bool,
    closed: AtomicBool,
}

impl FakeServer {
    fn new(tools: Vec<RemoteTool>) -> Self {
        Self {
            tools,
            calls: Mutex::new(Vec::new()),
            fail_listing: false,
            closed: AtomicBool::new(false),
        }
    }

    fn vm() -> Self {
        Self::new(vec![
            RemoteTool::new("ping")
                .with_description("Ping a host")
                .with_schema(json!({"type": "object", "properties": {"host": {"type": "string"}}})),
        ])
    }
}

#[async_trait]
impl McpSession for FakeServer {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, McpError> {
        if self.fail_listing {
            return Err(McpError::Transport("connection reset".into()));
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> Result<CallToolResult, McpError> {
        let arguments = Value::Object(arguments);
        self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
        match name {
            "ping" => Ok(CallToolResult::success(vec![
                Content::text("pong"),
                Content::text(format!("args={arguments}")),
            ])),
            _ => Ok(CallToolResult::error(vec![Content::text("unknown tool")])),
        }
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn adapter(service: &str, server: Arc<FakeServer>) -> McpAdapter {
    McpAdapter::with_session(service, server)
}

#[tokio::test]
async fn namespaced_remote_tool_is_callable_and_bare_name_is_not() {
    let server = Arc::new(FakeServer::vm());
    let adapter = adapter("vm", server.clone());

    let mut registry = ToolRegistry::new();
    assert_eq!(adapter.discover(&mut registry).await.unwrap(), 1);

    let descriptor = &registry.available()[0];
    assert_eq!(descriptor.name, "vm@ping");
    assert_eq!(descriptor.kind, ToolKind::Remote);
    assert_eq!(descriptor.description, "Ping a host");
    assert!(descriptor.input_schema.is_some());

    let ctx = ToolContext::default();
    let out = registry
        .exec(&ctx, &ToolCall::new("vm@ping", r#"{"host": "10.0.0.1"}"#))
        .await
        .unwrap();
    assert_eq!(out, "pong\nargs={\"host\":\"10.0.0.1\"}");

    let err = registry
        .exec(&ctx, &ToolCall::new("ping", "10.0.0.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::NotFound(name) if name == "ping"));

    let calls = server.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], ("ping".to_string(), json!({"host": "10.0.0.1"})));
}

#[tokio::test]
async fn plain_text_input_is_wrapped() {
    let server = Arc::new(FakeServer::vm());
    let mut registry = ToolRegistry::new();
    adapter("vm", server.clone()).discover(&mut registry).await.unwrap();

    registry
        .exec(&ToolContext::default(), &ToolCall::new("vm@ping", "example.com"))
        .await
        .unwrap();
    assert_eq!(server.calls.lock().unwrap()[0].1, json!({"input": "example.com"}));
}

#[tokio::test]
async fn rediscovery_replaces_service_entries_only() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FnTool::new("local", "local tool", |_| Ok("x".into()))));

    let first = adapter(
        "vm",
        Arc::new(FakeServer::new(vec![RemoteTool::new("ping"), RemoteTool::new("reboot")])),
    );
    first.discover(&mut registry).await.unwrap();
    assert_eq!(registry.names(), vec!["local", "vm@ping", "vm@reboot"]);

    adapter("vm", Arc::new(FakeServer::vm())).discover(&mut registry).await.unwrap();
    assert_eq!(registry.names(), vec!["local", "vm@ping"]);
}

#[tokio::test]
async fn failed_listing_keeps_existing_entries() {
    let mut registry = ToolRegistry::new();
    adapter("vm", Arc::new(FakeServer::vm()))
        .discover(&mut registry)
        .await
        .unwrap();

    let mut broken = FakeServer::vm();
    broken.fail_listing = true;
    let err = adapter("vm", Arc::new(broken)).discover(&mut registry).await.unwrap_err();
    assert!(matches!(err, McpError::Transport(_)));
    assert!(registry.get("vm@ping").is_some());
}

#[tokio::test]
async fn remote_is_error_becomes_tool_error() {
    let server = Arc::new(FakeServer::new(vec![RemoteTool::new("explode")]));
    let mut registry = ToolRegistry::new();
    adapter("vm", server).discover(&mut registry).await.unwrap();

    let err = registry
        .exec(&ToolContext::default(), &ToolCall::new("vm@explode", ""))
        .await
        .unwrap_err();
    match err {
        ToolError::ExecutionFailed { tool_name, reason } => {
            assert_eq!(tool_name, "vm@explode");
            assert!(reason.contains("unknown tool"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_context_short_circuits_proxy() {
    let server = Arc::new(FakeServer::vm());
    let mut registry = ToolRegistry::new();
    adapter("vm", server.clone()).discover(&mut registry).await.unwrap();

    let ctx = ToolContext::default();
    ctx.cancel.cancel();
    let err = registry
        .exec(&ctx, &ToolCall::new("vm@ping", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Cancelled(_)));
    assert!(server.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn close_reaches_the_session() {
    let server = Arc::new(FakeServer::vm());
    adapter("vm", server.clone()).close().await;
    assert!(server.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn stdio_service_that_cannot_start_fails_to_connect() {
    let config = McpServiceConfig {
        transport: McpTransportKind::Stdio,
        endpoint: "agentloom-no-such-mcp-server".into(),
        ..Default::default()
    };
    let err = McpAdapter::connect("files", &config).await.err().unwrap();
    assert!(matches!(err, McpError::Spawn { .. }));
}

#[tokio::test]
async fn http_service_sends_headers_not_env() {
    let mut config = McpServiceConfig {
        transport: McpTransportKind::Http,
        endpoint: "http://127.0.0.1:9/mcp".into(),
        ..Default::default()
    };
    config.headers.insert("bad header".into(), "x".into());
    let err = McpAdapter::connect("vm", &config).await.err().unwrap();
    assert!(matches!(err, McpError::InvalidHeader { name, .. } if name == "bad header"));

    // env never becomes a header, so the same entry there is not rejected
    config.headers.clear();
    config.env.insert("bad header".into(), "x".into());
    let attempt = tokio::time::timeout(std::time::Duration::from_secs(5), McpAdapter::connect("vm", &config)).await;
    if let Ok(result) = attempt {
        assert!(!matches!(result, Err(McpError::InvalidHeader { .. })));
    }
}
