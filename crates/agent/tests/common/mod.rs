//! Shared fixtures for the scenario tests.

#![allow(dead_code)]

use agentloom_agent::{AgentEvent, EventKind, Executor};
use agentloom_core::error::ToolError;
use agentloom_core::tool::{Tool, ToolContext, ToolKind, ToolRegistry};
use agentloom_core::FnTool;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Records every input a tool receives.
#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    pub fn inputs(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// A local tool returning `reply(input)` and recording its inputs.
pub fn recording_tool(
    name: &str,
    reply: impl Fn(&str) -> Result<String, ToolError> + Send + Sync + 'static,
) -> (Arc<dyn Tool>, Calls) {
    let calls = Calls::default();
    let seen = calls.clone();
    let tool = FnTool::new(name, format!("{name} tool"), move |input| {
        seen.0.lock().unwrap().push(input.to_string());
        reply(input)
    });
    (Arc::new(tool), calls)
}

/// A tool that claims to live on a remote service.
pub struct FakeRemote {
    pub name: String,
}

#[async_trait]
impl Tool for FakeRemote {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "remote tool"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Remote
    }

    async fn execute(&self, _ctx: &ToolContext, input: &str) -> Result<String, ToolError> {
        Ok(format!("{} got {input}", self.name))
    }
}

pub fn registry(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    Arc::new(registry)
}

/// Run to completion, returning the result and every emitted event.
pub async fn run_collect(executor: Executor, query: &str) -> (Executor, Result<String, agentloom_agent::AgentError>, Vec<AgentEvent>) {
    let (tx, mut rx) = mpsc::channel(256);
    let mut executor = executor.observe(tx);
    let result = executor.run(query).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (executor, result, events)
}

pub fn kinds(events: &[AgentEvent]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

pub fn count(events: &[AgentEvent], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}
