//! Chains: a DAG of named nodes, each running its own strategy in a nested
//! executor. A node's output (after its transform) is the input of every
//! successor whose condition accepts it.
//!
//! Chains can be built in code with closures, or declared in an agent's
//! config under `chain` (see [`ChainSpec`]).

use agentloom_core::agent::Framework;
use agentloom_core::message::Message;
use agentloom_core::prompt::PromptTemplate;
use agentloom_core::tool::ToolRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AgentError, ChainError};
use crate::event::EventKind;
use crate::executor::{Executor, ExecutorState, RunContext, Strategy};
use crate::parser::strip_final_answer;

pub type Transform = Arc<dyn Fn(&str) -> String + Send + Sync>;
pub type Condition = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct ChainNode {
    pub name: String,
    pub framework: Framework,
    pub max_steps: Option<usize>,
    pub system_prompt: Option<String>,
    transform: Option<Transform>,
    condition: Option<Condition>,
}

impl ChainNode {
    pub fn new(name: impl Into<String>, framework: Framework) -> Self {
        Self {
            name: name.into(),
            framework,
            max_steps: None,
            system_prompt: None,
            transform: None,
            condition: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Rewrite this node's output before it is handed on.
    pub fn with_transform(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Run this node only when the predecessor's output satisfies `f`.
    pub fn with_condition(mut self, f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(f));
        self
    }

    pub fn effective_max_steps(&self) -> usize {
        self.max_steps.unwrap_or_else(|| self.framework.default_max_steps())
    }

    pub fn transform(&self, output: &str) -> String {
        match &self.transform {
            Some(f) => f(output),
            None => output.to_string(),
        }
    }

    pub fn accepts(&self, input: &str) -> bool {
        self.condition.as_ref().is_none_or(|f| f(input))
    }
}

impl std::fmt::Debug for ChainNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainNode")
            .field("name", &self.name)
            .field("framework", &self.framework)
            .field("max_steps", &self.max_steps)
            .field("has_transform", &self.transform.is_some())
            .field("has_condition", &self.condition.is_some())
            .finish()
    }
}

/// A validated chain: unique names, known edge endpoints, one entry, no cycles.
#[derive(Debug, Clone)]
pub struct Chain {
    nodes: Vec<ChainNode>,
    edges: Vec<(String, String)>,
    entry: usize,
}

impl Chain {
    pub fn new(nodes: Vec<ChainNode>, edges: Vec<(String, String)>) -> Result<Self, ChainError> {
        let mut names = HashSet::new();
        for node in &nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ChainError::DuplicateNode(node.name.clone()));
            }
        }
        for (from, to) in &edges {
            for end in [from, to] {
                if !names.contains(end.as_str()) {
                    return Err(ChainError::UnknownNode(end.clone()));
                }
            }
        }

        let targets: HashSet<&str> = edges.iter().map(|(_, to)| to.as_str()).collect();
        let entries: Vec<usize> = (0..nodes.len())
            .filter(|i| !targets.contains(nodes[*i].name.as_str()))
            .collect();
        let [entry] = entries.as_slice() else {
            return Err(ChainError::EntryCount(
                entries.iter().map(|i| nodes[*i].name.clone()).collect(),
            ));
        };

        let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.name.as_str(), 0)).collect();
        for (_, to) in &edges {
            if let Some(d) = in_degree.get_mut(to.as_str()) {
                *d += 1;
            }
        }
        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut visited = 0;
        while let Some(name) = ready.pop_front() {
            visited += 1;
            for (_, to) in edges.iter().filter(|(from, _)| from == name) {
                if let Some(d) = in_degree.get_mut(to.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(to.as_str());
                    }
                }
            }
        }
        if visited != nodes.len() {
            return Err(ChainError::Cycle);
        }

        let entry = *entry;
        Ok(Self { nodes, edges, entry })
    }

    pub fn entry(&self) -> &ChainNode {
        &self.nodes[self.entry]
    }

    pub fn node(&self, name: &str) -> Option<&ChainNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn nodes(&self) -> &[ChainNode] {
        &self.nodes
    }

    /// Successors of `name` in declared edge order.
    pub fn successors(&self, name: &str) -> Vec<&ChainNode> {
        self.edges
            .iter()
            .filter(|(from, _)| from == name)
            .filter_map(|(_, to)| self.node(to))
            .collect()
    }
}

/// Supplies the strategy each chain node runs.
pub trait StrategyFactory: Send + Sync {
    /// The strategy for `node` and the system prompt to seed it with.
    fn node_strategy(&self, node: &ChainNode, tools: &ToolRegistry) -> Result<(Box<dyn Strategy>, String), AgentError>;
}

/// Runs one chain node per executor step.
pub struct ChainStrategy {
    chain: Arc<Chain>,
    factory: Arc<dyn StrategyFactory>,
    queue: VecDeque<(String, String)>,
    started: bool,
    last_output: String,
}

impl ChainStrategy {
    pub fn new(chain: Arc<Chain>, factory: Arc<dyn StrategyFactory>) -> Self {
        Self {
            chain,
            factory,
            queue: VecDeque::new(),
            started: false,
            last_output: String::new(),
        }
    }
}

#[async_trait]
impl Strategy for ChainStrategy {
    fn name(&self) -> &str {
        "chain"
    }

    async fn step(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
        if !self.started {
            self.started = true;
            let query = ctx
                .memory
                .first_user()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.queue.push_back((self.chain.entry().name.clone(), query));
        }

        let Some((name, input)) = self.queue.pop_front() else {
            ctx.update_state(ExecutorState::Finish);
            return Ok(self.last_output.clone());
        };
        let node = self
            .chain
            .node(&name)
            .cloned()
            .ok_or_else(|| AgentError::Chain(ChainError::UnknownNode(name.clone())))?;

        info!(node = %name, framework = %node.framework, "Running chain node");
        ctx.emit(
            EventKind::Metadata,
            format!("entering node {name}"),
            Some(serde_json::json!({ "node": name, "framework": node.framework })),
        )
        .await;

        let (strategy, system_prompt) = self.factory.node_strategy(&node, ctx.tools())?;
        let mut nested = Executor::nested(strategy, ctx.tools().clone(), ctx.sink(), ctx.cancel_token().clone())
            .with_max_steps(node.effective_max_steps())
            .with_system_prompt(system_prompt);
        let raw = nested.run(&input).await?;
        ctx.record_tools(nested.tools_used());

        let output = node.transform(strip_final_answer(&raw));
        ctx.push(Message::assistant(format!("[{name}] {output}"))).await;

        for successor in self.chain.successors(&name) {
            if successor.accepts(&output) {
                self.queue.push_back((successor.name.clone(), output.clone()));
            } else {
                debug!(from = %name, to = %successor.name, "Condition rejected successor");
            }
        }

        self.last_output = output.clone();
        if self.queue.is_empty() {
            ctx.update_state(ExecutorState::Finish);
        }
        Ok(output)
    }
}

// --- Declarative chains ---

/// A chain as written in agent config:
///
/// ```json
/// {
///   "nodes": [
///     {"name": "classify", "strategy": "react"},
///     {"name": "big", "condition": {"contains": "big"},
///      "transform": {"template": "Large breed: {{.Input}}"}}
///   ],
///   "edges": [["classify", "big"]]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default, alias = "framework")]
    pub strategy: Framework,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSpec {
    Contains(String),
    NotContains(String),
    Equals(String),
}

impl ConditionSpec {
    fn into_condition(self) -> Condition {
        match self {
            ConditionSpec::Contains(value) => Arc::new(move |s: &str| s.contains(value.as_str())),
            ConditionSpec::NotContains(value) => Arc::new(move |s: &str| !s.contains(value.as_str())),
            ConditionSpec::Equals(value) => Arc::new(move |s: &str| s.trim() == value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformSpec {
    Trim,
    Uppercase,
    Lowercase,
    /// `{{.Input}}` is replaced with the node output.
    Template(String),
}

impl TransformSpec {
    fn into_transform(self) -> Transform {
        match self {
            TransformSpec::Trim => Arc::new(|s: &str| s.trim().to_string()),
            TransformSpec::Uppercase => Arc::new(|s: &str| s.to_uppercase()),
            TransformSpec::Lowercase => Arc::new(|s: &str| s.to_lowercase()),
            TransformSpec::Template(body) => {
                let template = PromptTemplate::new("transform", "", body).with_variables(&["Input"]);
                Arc::new(move |s: &str| {
                    let bindings = HashMap::from([("Input".to_string(), s.to_string())]);
                    template.render(&bindings)
                })
            }
        }
    }
}

impl ChainSpec {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ChainError> {
        serde_json::from_value(value.clone()).map_err(|e| ChainError::InvalidSpec(e.to_string()))
    }

    pub fn into_chain(self) -> Result<Chain, ChainError> {
        let nodes = self
            .nodes
            .into_iter()
            .map(|spec| {
                let mut node = ChainNode::new(spec.name, spec.strategy);
                node.max_steps = spec.max_steps;
                node.system_prompt = spec.system_prompt;
                node.condition = spec.condition.map(ConditionSpec::into_condition);
                node.transform = spec.transform.map(TransformSpec::into_transform);
                node
            })
            .collect();
        Chain::new(nodes, self.edges)
    }
}
