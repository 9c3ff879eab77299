//! Plan-and-execute: ask the model for a dependency-ordered JSON plan, run its
//! steps one per executor step, replan on failure, then summarise.
//!
//! Step inputs may reference earlier results as `${step.N}`; a reference is
//! substituted only once step N has completed and is listed as a dependency.

use agentloom_config::RuntimeConfig;
use agentloom_core::error::{ProviderError, ToolError};
use agentloom_core::message::{Message, Role};
use agentloom_core::prompt;
use agentloom_core::provider::{Provider, ProviderRequest};
use agentloom_core::tool::ToolCall;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AgentError, PlanError};
use crate::event::EventKind;
use crate::executor::{ExecutorState, RunContext, Strategy};
use crate::strategy::{ToolFilter, describe_tools};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Executing => "executing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Planning,
    Executing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(deserialize_with = "lenient_id")]
    pub id: u32,
    #[serde(default)]
    pub description: String,
    /// Tool to call. Empty for steps that need no tool.
    #[serde(default)]
    pub tool: String,
    #[serde(default, deserialize_with = "input_as_text")]
    pub input: String,
    #[serde(default, deserialize_with = "lenient_ids")]
    pub dependencies: Vec<u32>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub goal: String,
    pub steps: Vec<PlanStep>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: PlanStatus,
}

/// Models sometimes send structured inputs; keep them as JSON text.
fn input_as_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn id_from_value<E: serde::de::Error>(value: &serde_json::Value) -> Result<u32, E> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| E::custom(format!("invalid step id: {value}")))
}

fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    id_from_value(&serde_json::Value::deserialize(d)?)
}

fn lenient_ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u32>, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::Array(items) => items.iter().map(id_from_value).collect(),
        serde_json::Value::Null => Ok(Vec::new()),
        other => Ok(vec![id_from_value(&other)?]),
    }
}

/// The span from the first `{` to the last `}`, inclusive.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Replace `${step.N}` for every completed dependency N with its result.
pub fn resolve_dependencies(input: &str, dependencies: &[u32], steps: &[PlanStep]) -> String {
    let mut resolved = input.to_string();
    for dep in dependencies {
        let Some(step) = steps.iter().find(|s| s.id == *dep) else {
            continue;
        };
        if step.status == StepStatus::Completed {
            resolved = resolved.replace(&format!("${{step.{dep}}}"), &step.result);
        }
    }
    resolved
}

/// Shorten to `max` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

impl Plan {
    /// Parse and validate a plan from a model reply.
    pub fn parse(reply: &str) -> Result<Plan, PlanError> {
        let json = extract_json(reply).ok_or(PlanError::NoJson)?;
        let plan: Plan = serde_json::from_str(json).map_err(|e| PlanError::InvalidJson(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Unique ids, known dependencies, no cycles.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::Empty);
        }
        let mut ids = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.id) {
                return Err(PlanError::DuplicateStep(step.id));
            }
        }
        for step in &self.steps {
            if let Some(dep) = step.dependencies.iter().find(|d| !ids.contains(d)) {
                return Err(PlanError::UnknownDependency {
                    step: step.id,
                    dependency: *dep,
                });
            }
        }

        // Kahn's algorithm: every step must be reachable from the roots.
        let mut in_degree: HashMap<u32, usize> =
            self.steps.iter().map(|s| (s.id, s.dependencies.len())).collect();
        let mut ready: VecDeque<u32> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0;
        while let Some(id) = ready.pop_front() {
            visited += 1;
            for step in self.steps.iter().filter(|s| s.dependencies.contains(&id)) {
                if let Some(degree) = in_degree.get_mut(&step.id) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(step.id);
                    }
                }
            }
        }
        if visited != self.steps.len() {
            return Err(PlanError::Cycle);
        }
        Ok(())
    }

    /// Reset every step to pending and begin execution.
    pub fn start(&mut self) {
        for step in &mut self.steps {
            step.status = StepStatus::Pending;
            step.result.clear();
        }
        self.status = PlanStatus::Executing;
        self.updated_at = Utc::now();
    }

    /// Index of the first pending step whose dependencies have all completed.
    pub fn next_eligible(&self) -> Option<usize> {
        self.steps.iter().position(|step| {
            step.status == StepStatus::Pending
                && step.dependencies.iter().all(|dep| {
                    self.steps
                        .iter()
                        .any(|s| s.id == *dep && s.status == StepStatus::Completed)
                })
        })
    }

    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Completed | StepStatus::Skipped))
    }

    pub fn resolved_input(&self, idx: usize) -> String {
        let step = &self.steps[idx];
        resolve_dependencies(&step.input, &step.dependencies, &self.steps)
    }

    /// One line per step, with errors for failed steps.
    pub fn status_report(&self, preview: usize) -> String {
        self.steps
            .iter()
            .map(|s| {
                let mut line = format!("Step {} [{}]: {}", s.id, s.status.as_str(), s.description);
                if s.status == StepStatus::Failed {
                    line.push_str(&format!(" - error: {}", truncate_chars(&s.result, preview)));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn completed_results(&self, preview: usize) -> String {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| format!("Step {}: {}\nResult: {}", s.id, s.description, truncate_chars(&s.result, preview)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Replanning and preview settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    pub enable_replan: bool,
    pub max_replans: usize,
    pub preview_chars: usize,
}

impl PlanOptions {
    pub fn from_runtime(runtime: &RuntimeConfig) -> Self {
        Self {
            enable_replan: runtime.enable_replan,
            max_replans: runtime.max_replans,
            preview_chars: runtime.result_preview_chars,
        }
    }

    /// Apply `enable_replan` / `max_replans` from an agent's config object.
    pub fn with_agent_config(mut self, config: &serde_json::Value) -> Self {
        if let Some(enabled) = config.get("enable_replan").and_then(|v| v.as_bool()) {
            self.enable_replan = enabled;
        }
        if let Some(max) = config.get("max_replans").and_then(|v| v.as_u64()) {
            self.max_replans = max as usize;
        }
        self
    }
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self::from_runtime(&RuntimeConfig::default())
    }
}

pub struct PlanStrategy {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    options: PlanOptions,
    plan: Option<Plan>,
    replans: usize,
}

impl PlanStrategy {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            options: PlanOptions::default(),
            plan: None,
            replans: 0,
        }
    }

    pub fn with_options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// One-shot chat outside the run's memory, keeping its system prompt.
    async fn chat(&self, ctx: &RunContext, prompt: String) -> Result<String, ProviderError> {
        let mut messages: Vec<Message> = ctx
            .memory
            .all()
            .iter()
            .filter(|m| m.role == Role::System)
            .cloned()
            .collect();
        messages.push(Message::user(prompt));
        let request = ProviderRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        Ok(self.provider.complete(request).await?.message.content)
    }

    async fn thinking_error(ctx: &mut RunContext, e: ProviderError) -> String {
        warn!(error = %e, "Chat call failed");
        let text = format!("Error during thinking: {e}");
        ctx.push(Message::assistant(text.clone())).await;
        text
    }

    async fn emit_plan(ctx: &mut RunContext, plan: &Plan, content: &str) {
        let metadata = serde_json::to_value(plan).ok().map(|p| serde_json::json!({ "plan": p }));
        ctx.emit(EventKind::Metadata, content, metadata).await;
    }

    async fn create_plan(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
        let query = ctx
            .memory
            .first_user()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let tools = describe_tools(ctx.tools(), &ToolFilter::all(), None);
        let prompt = prompt::global().build("plan", [("Query", query.as_str()), ("Tools", tools.as_str())])?;

        let reply = match self.chat(ctx, prompt).await {
            Ok(reply) => reply,
            Err(e) => return Ok(Self::thinking_error(ctx, e).await),
        };

        match Plan::parse(&reply) {
            Ok(mut plan) => {
                plan.start();
                info!(goal = %plan.goal, steps = plan.steps.len(), "Plan created");
                ctx.push_silent(Message::assistant(reply));
                Self::emit_plan(ctx, &plan, "plan created").await;
                let text = format!("Created plan with {} steps: {}", plan.steps.len(), plan.goal);
                self.plan = Some(plan);
                Ok(text)
            }
            Err(e) => {
                warn!(error = %e, "Could not parse plan");
                let text = format!("Failed to parse plan: {e}");
                ctx.push(Message::assistant(text.clone())).await;
                Ok(text)
            }
        }
    }

    async fn execute_step(&mut self, ctx: &mut RunContext, idx: usize) -> Result<String, AgentError> {
        let Some(plan) = self.plan.as_mut() else {
            return Err(AgentError::Internal("no active plan".into()));
        };
        let input = plan.resolved_input(idx);
        let step = &mut plan.steps[idx];
        step.status = StepStatus::Executing;
        debug!(step = step.id, tool = %step.tool, "Executing plan step");

        let outcome = if step.tool.is_empty() {
            Ok(if input.is_empty() { step.description.clone() } else { input })
        } else {
            ctx.dispatch(&ToolCall::new(step.tool.clone(), input)).await
        };

        let result = match outcome {
            Ok(result) => {
                step.status = StepStatus::Completed;
                result
            }
            Err(ToolError::Cancelled(_)) => return Err(AgentError::Cancelled),
            Err(e) => {
                warn!(step = step.id, error = %e, "Plan step failed");
                step.status = StepStatus::Failed;
                e.to_string()
            }
        };
        step.result = result.clone();
        let (id, description) = (step.id, step.description.clone());
        plan.updated_at = Utc::now();

        ctx.push(Message::assistant(format!("Completed step {id}: {description}"))).await;
        ctx.push(Message::user(format!(
            "Result: {}",
            truncate_chars(&result, self.options.preview_chars)
        )))
        .await;
        Ok(result)
    }

    async fn summarise(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
        let Some(plan) = self.plan.as_mut() else {
            return Err(AgentError::Internal("no active plan".into()));
        };
        plan.status = PlanStatus::Completed;
        plan.updated_at = Utc::now();
        let results = plan.completed_results(self.options.preview_chars);
        let goal = plan.goal.clone();
        Self::emit_plan(ctx, plan, "plan completed").await;

        let prompt = prompt::global().build("summary", [("Goal", goal.as_str()), ("Results", results.as_str())])?;
        let summary = match self.chat(ctx, prompt).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => results,
            Err(e) => {
                warn!(error = %e, "Summary call failed; returning raw results");
                results
            }
        };
        ctx.push(Message::assistant(summary.clone())).await;
        ctx.update_state(ExecutorState::Finish);
        Ok(summary)
    }

    async fn replan(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
        let Some(plan) = self.plan.as_ref() else {
            return Err(AgentError::Internal("no active plan".into()));
        };
        self.replans += 1;
        info!(attempt = self.replans, max = self.options.max_replans, "Replanning");

        let report = plan.status_report(self.options.preview_chars);
        let tools = describe_tools(ctx.tools(), &ToolFilter::all(), None);
        let prompt = prompt::global().build(
            "replan",
            [("Goal", plan.goal.as_str()), ("Status", report.as_str()), ("Tools", tools.as_str())],
        )?;

        let reply = match self.chat(ctx, prompt).await {
            Ok(reply) => reply,
            Err(e) => return Ok(Self::thinking_error(ctx, e).await),
        };

        match Plan::parse(&reply) {
            Ok(revised) => {
                let Some(plan) = self.plan.as_mut() else {
                    return Err(AgentError::Internal("no active plan".into()));
                };
                plan.steps = revised.steps;
                plan.start();
                ctx.push_silent(Message::assistant(reply));
                Self::emit_plan(ctx, plan, "plan revised").await;
                Ok(format!("Replanned with {} steps", plan.steps.len()))
            }
            Err(e) => {
                warn!(error = %e, "Could not parse revised plan");
                let text = format!("Failed to parse plan: {e}");
                ctx.push(Message::assistant(text.clone())).await;
                Ok(text)
            }
        }
    }

    async fn fail(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
        let Some(plan) = self.plan.as_mut() else {
            return Err(AgentError::Internal("no active plan".into()));
        };
        plan.status = PlanStatus::Failed;
        plan.updated_at = Utc::now();
        let failed: Vec<String> = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| format!("step {} ({})", s.id, s.result))
            .collect();
        let text = if failed.is_empty() {
            "Plan failed: no executable steps remain".to_string()
        } else {
            format!("Plan failed: {}", failed.join("; "))
        };
        warn!(goal = %plan.goal, "{text}");
        Self::emit_plan(ctx, plan, "plan failed").await;
        ctx.push_silent(Message::assistant(text.clone()));
        ctx.fail();
        Ok(text)
    }
}

#[async_trait]
impl Strategy for PlanStrategy {
    fn name(&self) -> &str {
        "plan"
    }

    async fn step(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
        if self.plan.is_none() {
            return self.create_plan(ctx).await;
        }
        let (next, complete) = self
            .plan
            .as_ref()
            .map(|plan| (plan.next_eligible(), plan.is_complete()))
            .unwrap_or((None, false));
        match next {
            Some(idx) => self.execute_step(ctx, idx).await,
            None if complete => self.summarise(ctx).await,
            None if self.options.enable_replan && self.replans < self.options.max_replans => self.replan(ctx).await,
            None => self.fail(ctx).await,
        }
    }
}
