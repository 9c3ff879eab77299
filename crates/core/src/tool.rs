//! Tool trait and registry: the abstraction over agent capabilities.
//!
//! Every tool, local or remote, is wrapped behind the same two-argument shape:
//! a run context and a text input, returning a text observation. Tools that
//! accept structured input parse the text themselves.
//!
//! Remote tools are namespaced as `service@tool`. The separator is not a
//! valid character in unqualified tool names.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Separator between a remote service name and the remote tool name.
pub const NAMESPACE_SEP: char = '@';

/// Build a namespaced tool name (`service@tool`).
pub fn qualified_name(service: &str, tool: &str) -> String {
    format!("{service}{NAMESPACE_SEP}{tool}")
}

/// Split a namespaced tool name into `(service, tool)`.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    name.split_once(NAMESPACE_SEP)
}

/// Where a tool's handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// In-process handler, described to the model through the system prompt
    #[default]
    Local,
    /// Proxy to a remote endpoint, described to the model as a structured tool
    Remote,
}

/// The public description of a registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    pub kind: ToolKind,
}

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID (matches the model's tool_call.id for structured calls)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Input text; may itself be JSON
    pub input: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            input: input.into(),
        }
    }
}

/// Per-run context handed to every tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The run this call belongs to
    pub run_id: String,

    /// Cancelled when the caller abandons the run
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(run_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            run_id: run_id.into(),
            cancel,
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "current_time", "vm@ping").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input, when it has one.
    fn parameters_schema(&self) -> Option<serde_json::Value> {
        None
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Local
    }

    /// Execute the tool with the given input text.
    async fn execute(&self, ctx: &ToolContext, input: &str) -> Result<String, ToolError>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
            kind: self.kind(),
        }
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema().unwrap_or_else(|| {
                serde_json::json!({
                    "type": "object",
                    "properties": { "input": { "type": "string" } }
                })
            }),
        }
    }
}

type ToolFn = dyn Fn(&str) -> Result<String, ToolError> + Send + Sync;

/// A local tool backed by a synchronous closure.
pub struct FnTool {
    name: String,
    description: String,
    schema: Option<serde_json::Value>,
    handler: Arc<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: None,
            handler: Arc::new(handler),
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Option<serde_json::Value> {
        self.schema.clone()
    }

    async fn execute(&self, ctx: &ToolContext, input: &str) -> Result<String, ToolError> {
        if ctx.cancel.is_cancelled() {
            return Err(ToolError::Cancelled(self.name.clone()));
        }
        (self.handler)(input)
    }
}

/// A registry of available tools.
///
/// Lookups that miss locally fall through to the parent registry, so a
/// per-run registry can layer remote tools over the process-wide one.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    parent: Option<Arc<ToolRegistry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that delegates misses to `parent`.
    pub fn child_of(parent: Arc<ToolRegistry>) -> Self {
        Self {
            tools: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Establish a parent registry for fallback lookup.
    pub fn inherit(&mut self, parent: Arc<ToolRegistry>) {
        self.parent = Some(parent);
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced registered tool");
        }
    }

    /// Remove every local tool registered under `service@`.
    pub fn remove_service(&mut self, service: &str) -> usize {
        let before = self.tools.len();
        self.tools
            .retain(|name, _| !matches!(split_qualified(name), Some((s, _)) if s == service));
        before - self.tools.len()
    }

    /// Get a tool by name, checking the local table first.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        match self.tools.get(name) {
            Some(tool) => Some(tool.clone()),
            None => self.parent.as_ref().and_then(|p| p.get(name)),
        }
    }

    /// Every visible tool. Local entries shadow parent entries of the same name.
    fn visible(&self) -> Vec<Arc<dyn Tool>> {
        let mut merged: HashMap<String, Arc<dyn Tool>> = match &self.parent {
            Some(parent) => parent
                .visible()
                .into_iter()
                .map(|t| (t.name().to_string(), t))
                .collect(),
            None => HashMap::new(),
        };
        for (name, tool) in &self.tools {
            merged.insert(name.clone(), tool.clone());
        }
        let mut tools: Vec<_> = merged.into_values().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Descriptors of every visible tool, sorted by name.
    ///
    /// Filtering is left to the caller.
    pub fn available(&self) -> Vec<ToolDescriptor> {
        self.visible().iter().map(|t| t.descriptor()).collect()
    }

    /// Definitions of every visible tool of the given kind (for sending to the LLM).
    pub fn definitions(&self, kind: ToolKind) -> Vec<ToolDefinition> {
        self.visible()
            .iter()
            .filter(|t| t.kind() == kind)
            .map(|t| t.to_definition())
            .collect()
    }

    /// Execute a tool call, delegating to the parent when absent locally.
    pub async fn exec(&self, ctx: &ToolContext, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(ctx, &call.input).await
    }

    /// Names of every visible tool, sorted.
    pub fn names(&self) -> Vec<String> {
        self.visible().iter().map(|t| t.name().to_string()).collect()
    }

    /// Number of tools registered locally (excluding the parent).
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
