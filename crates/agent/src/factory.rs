//! Turning a stored agent definition into a ready-to-run [`Executor`].
//!
//! Each run gets its own tool registry: a child of the process-wide registry
//! plus proxies for the agent's remote services. A service that cannot be
//! reached is logged and skipped; the run proceeds with the tools it has.

use agentloom_config::{AppConfig, McpServiceConfig, RuntimeConfig};
use agentloom_core::agent::{AgentDefinition, AgentStore, Framework};
use agentloom_core::prompt;
use agentloom_core::provider::Provider;
use agentloom_core::tool::{ToolKind, ToolRegistry};
use agentloom_mcp::McpAdapter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AgentError, ChainError};
use crate::executor::{Executor, Strategy};
use crate::strategy::chain::{ChainNode, ChainSpec, ChainStrategy, StrategyFactory};
use crate::strategy::domain::{Domain, DomainStrategy};
use crate::strategy::plan::{PlanOptions, PlanStrategy};
use crate::strategy::react::{BaseReact, ReactStrategy};
use crate::strategy::{ToolFilter, describe_tools};

/// A chat request as received from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub agent_id: String,
    pub query: String,
    #[serde(flatten)]
    pub overrides: RunOverrides,
}

impl RunRequest {
    pub fn new(agent_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            query: query.into(),
            overrides: RunOverrides::default(),
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent_id.trim().is_empty() {
            return Err(AgentError::InvalidRequest("agent_id is required".into()));
        }
        if self.overrides.max_steps == Some(0) {
            return Err(AgentError::InvalidRequest("max_steps must be positive".into()));
        }
        Ok(())
    }
}

/// Per-run replacements for stored agent values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

/// Builds strategies for one agent. Cloned into chain nodes.
#[derive(Clone)]
struct StrategyBuilder {
    provider: Arc<dyn Provider>,
    runtime: RuntimeConfig,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    agent_config: serde_json::Value,
}

impl StrategyBuilder {
    fn react_base(&self) -> BaseReact {
        BaseReact::new(self.provider.clone(), &self.model)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    /// The strategy for `framework` and its rendered system prompt.
    fn build(
        &self,
        framework: Framework,
        base_prompt: &str,
        tools: &ToolRegistry,
    ) -> Result<(Box<dyn Strategy>, String), AgentError> {
        match framework {
            Framework::React => {
                let prompt = react_prompt("react", base_prompt, tools, &ToolFilter::all())?;
                Ok((Box::new(ReactStrategy::new(self.react_base())), prompt))
            }
            Framework::Es | Framework::Sql => {
                let domain = if framework == Framework::Es {
                    Domain::Elasticsearch
                } else {
                    Domain::Sql
                };
                let filter = domain.filter(&self.agent_config);
                let prompt = react_prompt(domain.template_id(), base_prompt, tools, &filter)?;
                let base = self.react_base().with_filter(filter);
                Ok((Box::new(DomainStrategy::new(domain, base)), prompt))
            }
            Framework::Plan => {
                let options = PlanOptions::from_runtime(&self.runtime).with_agent_config(&self.agent_config);
                let strategy = PlanStrategy::new(self.provider.clone(), &self.model)
                    .with_temperature(self.temperature)
                    .with_max_tokens(self.max_tokens)
                    .with_options(options);
                Ok((Box::new(strategy), base_prompt.to_string()))
            }
            Framework::Chain => {
                let value = self
                    .agent_config
                    .get("chain")
                    .ok_or_else(|| ChainError::InvalidSpec("agent config has no 'chain' entry".into()))?;
                let chain = ChainSpec::from_value(value)?.into_chain()?;
                let nodes = NodeFactory {
                    builder: self.clone(),
                    base_prompt: base_prompt.to_string(),
                };
                let strategy = ChainStrategy::new(Arc::new(chain), Arc::new(nodes));
                Ok((Box::new(strategy), base_prompt.to_string()))
            }
        }
    }
}

fn react_prompt(template: &str, base_prompt: &str, tools: &ToolRegistry, filter: &ToolFilter) -> Result<String, AgentError> {
    let listing = describe_tools(tools, filter, Some(ToolKind::Local));
    Ok(prompt::global().build(
        template,
        [("SystemPrompt", base_prompt), ("Tools", listing.as_str())],
    )?)
}

/// Strategies for the nodes of a chain agent.
struct NodeFactory {
    builder: StrategyBuilder,
    base_prompt: String,
}

impl StrategyFactory for NodeFactory {
    fn node_strategy(&self, node: &ChainNode, tools: &ToolRegistry) -> Result<(Box<dyn Strategy>, String), AgentError> {
        if node.framework == Framework::Chain {
            return Err(AgentError::InvalidRequest(format!(
                "chain node '{}' cannot itself be a chain",
                node.name
            )));
        }
        let own = node.system_prompt.as_deref().unwrap_or(&self.base_prompt);
        let framed = prompt::global().build("chain", [("SystemPrompt", own), ("Node", node.name.as_str())])?;
        self.builder.build(node.framework, &framed, tools)
    }
}

/// Builds executors for stored agents.
pub struct AgentFactory {
    provider: Arc<dyn Provider>,
    runtime: RuntimeConfig,
    mcp: BTreeMap<String, McpServiceConfig>,
    tools: Arc<ToolRegistry>,
    default_model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl AgentFactory {
    pub fn new(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        Self {
            provider,
            runtime: config.runtime.clone(),
            mcp: config.mcp.clone(),
            tools: agentloom_tools::global(),
            default_model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
        }
    }

    /// Use `tools` instead of the process-wide registry as the base layer.
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Base registry plus proxies for the agent's remote services.
    pub async fn registry_for(&self, agent: &AgentDefinition) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::child_of(self.tools.clone());
        for service in &agent.mcp_services {
            let Some(config) = self.mcp.get(service) else {
                warn!(agent_id = %agent.id, service = %service, "Agent references an unconfigured MCP service");
                continue;
            };
            let adapter = match McpAdapter::connect(service, config).await {
                Ok(adapter) => adapter,
                Err(e) => {
                    warn!(agent_id = %agent.id, service = %service, error = %e, "Skipping unreachable MCP service");
                    continue;
                }
            };
            match adapter.discover(&mut registry).await {
                Ok(count) => info!(service = %service, tools = count, "Registered remote tools"),
                Err(e) => warn!(service = %service, error = %e, "Remote tool discovery failed"),
            }
        }
        Arc::new(registry)
    }

    fn max_steps_for(&self, agent: &AgentDefinition, overrides: &RunOverrides) -> usize {
        overrides.max_steps.or(agent.max_steps).unwrap_or(match agent.framework {
            Framework::Plan => self.runtime.plan_max_steps,
            _ => self.runtime.default_max_steps,
        })
    }

    /// An executor for `agent` with `overrides` applied.
    pub async fn build(&self, agent: &AgentDefinition, overrides: &RunOverrides) -> Result<Executor, AgentError> {
        let tools = self.registry_for(agent).await;
        let model = overrides
            .model
            .clone()
            .or_else(|| agent.model.clone())
            .unwrap_or_else(|| self.default_model.clone());
        let base_prompt = overrides
            .system_prompt
            .clone()
            .unwrap_or_else(|| agent.system_prompt.clone());

        let builder = StrategyBuilder {
            provider: self.provider.clone(),
            runtime: self.runtime.clone(),
            model: model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            agent_config: agent.config.clone(),
        };
        let (strategy, system_prompt) = builder.build(agent.framework, &base_prompt, &tools)?;
        let max_steps = self.max_steps_for(agent, overrides);

        info!(
            agent_id = %agent.id,
            framework = %agent.framework,
            model = %model,
            max_steps,
            tools = tools.available().len(),
            "Built executor"
        );
        Ok(Executor::new(strategy, tools)
            .with_max_steps(max_steps)
            .with_system_prompt(system_prompt))
    }

    /// Look up the requested agent and build its executor.
    pub async fn for_request(&self, store: &dyn AgentStore, request: &RunRequest) -> Result<Executor, AgentError> {
        request.validate()?;
        let agent = store.get(&request.agent_id).await?;
        self.build(&agent, &request.overrides).await
    }
}
