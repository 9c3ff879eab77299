//! Agent-level error types.
//!
//! Most failures inside a run are turned into text and fed back to the model;
//! only cancellation and fatal errors leave the executor as `Err`.

use agentloom_core::error::{PromptError, ProviderError, StoreError, ToolError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("run cancelled")]
    Cancelled,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(ToolError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ToolError> for AgentError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::Cancelled(_) => AgentError::Cancelled,
            other => AgentError::Tool(other),
        }
    }
}

impl From<StoreError> for AgentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => AgentError::AgentNotFound(id),
            StoreError::Unavailable(reason) => AgentError::Internal(reason),
        }
    }
}

/// Problems with a plan produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("no JSON object found in reply")]
    NoJson,

    #[error("invalid plan JSON: {0}")]
    InvalidJson(String),

    #[error("plan has no steps")]
    Empty,

    #[error("duplicate step id {0}")]
    DuplicateStep(u32),

    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: u32, dependency: u32 },

    #[error("plan dependencies contain a cycle")]
    Cycle,
}

/// Problems with a chain definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("duplicate chain node '{0}'")]
    DuplicateNode(String),

    #[error("edge references unknown node '{0}'")]
    UnknownNode(String),

    #[error("chain must have exactly one entry node, found {0:?}")]
    EntryCount(Vec<String>),

    #[error("chain contains a cycle")]
    Cycle,

    #[error("invalid chain spec: {0}")]
    InvalidSpec(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_tool_error_maps_to_cancelled() {
        let err: AgentError = ToolError::Cancelled("vm@ping".into()).into();
        assert!(matches!(err, AgentError::Cancelled));

        let err: AgentError = ToolError::NotFound("x".into()).into();
        assert!(err.to_string().contains("tool-not-found: x"));
    }

    #[test]
    fn store_not_found_maps_to_agent_not_found() {
        let err: AgentError = StoreError::NotFound("dog".into()).into();
        assert!(matches!(err, AgentError::AgentNotFound(id) if id == "dog"));
    }
}
