//! ReAct: alternate model "thoughts" with tool actions until the model emits
//! `Action: Finish[answer]`.
//!
//! [`BaseReact`] holds the loop itself and is shared by the plain ReAct
//! strategy and the domain strategies, which differ only in prompt and tool
//! subset.

use agentloom_core::error::ToolError;
use agentloom_core::message::{Message, Role};
use agentloom_core::provider::{Provider, ProviderRequest, ToolDefinition};
use agentloom_core::tool::{ToolCall, ToolKind, ToolRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::executor::{ExecutorState, RunContext, Strategy};
use crate::parser::{finish_answer, parse_actions, signals_finish};
use crate::strategy::ToolFilter;

/// Outcome of the thought phase.
enum Thought {
    /// Run the action phase on this reply.
    Act(Message),
    /// Nothing to act on; the step returns this text.
    Done(String),
}

/// Model-driven thought/action loop.
pub struct BaseReact {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    filter: ToolFilter,
}

impl BaseReact {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            filter: ToolFilter::all(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_filter(mut self, filter: ToolFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> &ToolFilter {
        &self.filter
    }

    /// Remote tools are offered as structured definitions; local tools are
    /// described in the system prompt only.
    fn structured_tools(&self, registry: &ToolRegistry) -> Vec<ToolDefinition> {
        registry
            .definitions(ToolKind::Remote)
            .into_iter()
            .filter(|d| self.filter.matches(&d.name))
            .collect()
    }

    async fn think(&self, ctx: &mut RunContext) -> Thought {
        if let Some(last) = ctx.memory.last() {
            if last.role == Role::Assistant && signals_finish(&last.content) {
                let reply = last.clone();
                ctx.update_state(ExecutorState::Finish);
                return Thought::Act(reply);
            }
        }

        let request = ProviderRequest::new(&self.model, ctx.memory.all().to_vec())
            .with_tools(self.structured_tools(ctx.tools()))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        match self.provider.complete(request).await {
            Ok(response) => {
                let reply = response.message;
                ctx.push(reply.clone()).await;
                if finish_answer(&reply.content).is_some() {
                    ctx.update_state(ExecutorState::Finish);
                }
                Thought::Act(reply)
            }
            Err(e) => {
                warn!(provider = %self.provider.name(), error = %e, "Chat call failed");
                let text = format!("Error during thinking: {e}");
                ctx.push(Message::assistant(text.clone())).await;
                Thought::Done(text)
            }
        }
    }

    async fn act(&self, ctx: &mut RunContext, reply: Message) -> Result<String, AgentError> {
        if ctx.state() == ExecutorState::Finish {
            let answer = finish_answer(&reply.content).unwrap_or_else(|| reply.content.clone());
            return Ok(format!("Final answer: {answer}"));
        }

        // Structured calls answer with tool-role messages so the provider can
        // pair them with their call ids. Textual actions follow.
        let structured: Vec<ToolCall> = reply
            .tool_calls
            .iter()
            .map(|tc| ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: tc.arguments.clone(),
            })
            .collect();
        let textual: Vec<ToolCall> = parse_actions(&reply.content)
            .into_iter()
            .filter(|a| !a.is_finish())
            .map(|a| ToolCall::new(a.name, a.input))
            .collect();
        if structured.is_empty() && textual.is_empty() {
            return Ok(reply.content);
        }

        let mut last = String::new();
        if !structured.is_empty() {
            match self.run_calls(ctx, &structured, true).await? {
                Ok(result) => last = result,
                Err(failure) => return Ok(failure),
            }
        }
        if !textual.is_empty() {
            match self.run_calls(ctx, &textual, false).await? {
                Ok(result) => last = result,
                Err(failure) => return Ok(failure),
            }
        }
        Ok(last)
    }

    /// Dispatch `calls` in order. The inner `Err` carries the observation of
    /// the first failed call; later calls are not run.
    async fn run_calls(
        &self,
        ctx: &mut RunContext,
        calls: &[ToolCall],
        structured: bool,
    ) -> Result<Result<String, String>, AgentError> {
        let mut last = String::new();
        for (idx, call) in calls.iter().enumerate() {
            debug!(tool = %call.name, structured, "Executing action");
            match ctx.dispatch(call).await {
                Ok(result) => {
                    let observation = format!("Observation: {result}");
                    ctx.push(observation_message(call, observation, structured)).await;
                    last = result;
                }
                Err(ToolError::Cancelled(_)) => return Err(AgentError::Cancelled),
                Err(e) => {
                    let text = format!("Tool execution error: {e}");
                    ctx.push(observation_message(call, text.clone(), structured)).await;
                    if structured {
                        for skipped in &calls[idx + 1..] {
                            ctx.push_silent(
                                Message::tool_result(&skipped.id, "Not executed: an earlier call failed")
                                    .named(&skipped.name),
                            );
                        }
                    }
                    return Ok(Err(text));
                }
            }
        }
        Ok(Ok(last))
    }
}

fn observation_message(call: &ToolCall, content: String, structured: bool) -> Message {
    if structured {
        Message::tool_result(&call.id, content).named(&call.name)
    } else {
        Message::user(content)
    }
}

#[async_trait]
impl Strategy for BaseReact {
    fn name(&self) -> &str {
        "react"
    }

    async fn step(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
        match self.think(ctx).await {
            Thought::Act(reply) => self.act(ctx, reply).await,
            Thought::Done(text) => Ok(text),
        }
    }
}

/// The general-purpose ReAct strategy.
pub struct ReactStrategy {
    base: BaseReact,
}

impl ReactStrategy {
    pub fn new(base: BaseReact) -> Self {
        Self { base }
    }
}

#[async_trait]
impl Strategy for ReactStrategy {
    fn name(&self) -> &str {
        "react"
    }

    async fn step(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
        self.base.step(ctx).await
    }
}
