//! Agent definitions and the store that supplies them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;

/// Which reasoning strategy an agent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    #[default]
    React,
    Plan,
    Chain,
    Es,
    Sql,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::React => "react",
            Framework::Plan => "plan",
            Framework::Chain => "chain",
            Framework::Es => "es",
            Framework::Sql => "sql",
        }
    }

    /// Step budget used when the agent does not set one.
    pub fn default_max_steps(&self) -> usize {
        match self {
            Framework::Plan => 50,
            _ => 10,
        }
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "react" => Ok(Framework::React),
            "plan" => Ok(Framework::Plan),
            "chain" => Ok(Framework::Chain),
            "es" | "elasticsearch" => Ok(Framework::Es),
            "sql" => Ok(Framework::Sql),
            other => Err(format!("unknown framework: {other}")),
        }
    }
}

/// A stored agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub framework: Framework,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Remote services whose tools this agent may call
    #[serde(default)]
    pub mcp_services: Vec<String>,
    #[serde(default)]
    pub connection_config: serde_json::Value,
    /// Strategy-specific options (plan replanning, chain graph, tool prefixes)
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, framework: Framework) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            framework,
            description: String::new(),
            system_prompt: String::new(),
            max_steps: None,
            model: None,
            mcp_services: Vec::new(),
            connection_config: serde_json::Value::Null,
            config: serde_json::Value::Null,
            is_active: true,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn effective_max_steps(&self) -> usize {
        self.max_steps
            .unwrap_or_else(|| self.framework.default_max_steps())
    }

    /// Look up a key in the strategy config object.
    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }
}

/// Read access to persisted agent definitions.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Fetch an active agent. Inactive agents are reported as not found.
    async fn get(&self, id: &str) -> Result<AgentDefinition, StoreError>;

    /// All agents, active or not, ordered by id.
    async fn list(&self) -> Result<Vec<AgentDefinition>, StoreError>;
}

/// An [`AgentStore`] held in memory, typically seeded from configuration.
#[derive(Debug, Default)]
pub struct InMemoryAgentStore {
    agents: RwLock<HashMap<String, AgentDefinition>>,
}

impl InMemoryAgentStore {
    pub fn new(agents: impl IntoIterator<Item = AgentDefinition>) -> Self {
        Self {
            agents: RwLock::new(agents.into_iter().map(|a| (a.id.clone(), a)).collect()),
        }
    }

    pub fn insert(&self, agent: AgentDefinition) -> Result<(), StoreError> {
        self.agents
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .insert(agent.id.clone(), agent);
        Ok(())
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn get(&self, id: &str) -> Result<AgentDefinition, StoreError> {
        let agents = self
            .agents
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        agents
            .get(id)
            .filter(|a| a.is_active)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<AgentDefinition>, StoreError> {
        let agents = self
            .agents
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut list: Vec<_> = agents.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }
}
