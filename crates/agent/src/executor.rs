//! The executor: owns a run's memory, state and step budget, and drives a
//! [`Strategy`] one step at a time.
//!
//! ```text
//!  Idle ──run()──▶ Running ──▶ Finish   (final answer or strategy finished)
//!                     │
//!                     └─────▶ Error    (budget exhausted, strategy failed)
//! ```
//!
//! Strategies never see the executor itself. They get a [`RunContext`] with
//! memory, the tool registry and the event sink, which keeps the
//! executor/strategy relationship one-directional.

use agentloom_core::error::ToolError;
use agentloom_core::memory::Memory;
use agentloom_core::message::Message;
use agentloom_core::tool::{ToolCall, ToolContext, ToolRegistry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::event::{AgentEvent, EventKind};
use crate::parser::has_final_answer;

/// How long a cancelled run waits for room in a full event channel.
const CANCEL_EVENT_TIMEOUT: Duration = Duration::from_millis(500);

/// Returned when the budget runs out before anything was produced.
pub const NO_RESULTS: &str = "No results generated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorState {
    #[default]
    Idle,
    Running,
    Finish,
    Error,
}

impl ExecutorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorState::Idle => "idle",
            ExecutorState::Running => "running",
            ExecutorState::Finish => "finish",
            ExecutorState::Error => "error",
        }
    }

    /// Idle moves to Running; Running moves to Finish or Error. Nothing else.
    pub fn can_transition(self, to: ExecutorState) -> bool {
        matches!(
            (self, to),
            (ExecutorState::Idle, ExecutorState::Running)
                | (ExecutorState::Running, ExecutorState::Finish)
                | (ExecutorState::Running, ExecutorState::Error)
        )
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reasoning strategy. Each call performs one unit of work and returns the
/// text it produced.
///
/// Recoverable problems (provider failures, tool errors, bad plans) should be
/// written to memory and returned as text so the model can react to them.
/// Returning `Err` ends the run.
#[async_trait]
pub trait Strategy: Send {
    fn name(&self) -> &str;

    async fn step(&mut self, ctx: &mut RunContext) -> Result<String, AgentError>;
}

/// Everything a strategy may touch during a run.
pub struct RunContext {
    pub memory: Memory,
    state: ExecutorState,
    step: usize,
    tools: Arc<ToolRegistry>,
    tool_ctx: ToolContext,
    sink: Option<mpsc::Sender<AgentEvent>>,
    tools_used: BTreeSet<String>,
    nested: bool,
}

impl RunContext {
    fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            memory: Memory::new(),
            state: ExecutorState::Idle,
            step: 0,
            tools,
            tool_ctx: ToolContext::new(uuid::Uuid::new_v4().to_string(), CancellationToken::new()),
            sink: None,
            tools_used: BTreeSet::new(),
            nested: false,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Apply a legal transition. Returns false (and changes nothing) otherwise.
    pub fn update_state(&mut self, to: ExecutorState) -> bool {
        if self.state.can_transition(to) {
            debug!(from = %self.state, to = %to, "Executor state change");
            self.state = to;
            true
        } else {
            false
        }
    }

    /// Mark the run failed. The executor emits an `Error` event after the
    /// current step returns.
    pub fn fail(&mut self) -> bool {
        self.update_state(ExecutorState::Error)
    }

    /// 1-based number of the step in progress.
    pub fn step_number(&self) -> usize {
        self.step + 1
    }

    pub fn run_id(&self) -> &str {
        &self.tool_ctx.run_id
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.tool_ctx.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.tool_ctx.cancel.is_cancelled()
    }

    pub(crate) fn sink(&self) -> Option<mpsc::Sender<AgentEvent>> {
        self.sink.clone()
    }

    pub fn tools_used(&self) -> &BTreeSet<String> {
        &self.tools_used
    }

    pub(crate) fn record_tools<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        self.tools_used.extend(names.into_iter().cloned());
    }

    /// Append a message and emit the event it classifies as.
    pub async fn push(&mut self, message: Message) {
        let kind = EventKind::classify(&message);
        let content = message.content.clone();
        self.memory.append(message);
        if let Some(kind) = kind {
            self.emit(kind, content, None).await;
        }
    }

    /// Append a message without emitting an event.
    pub fn push_silent(&mut self, message: Message) {
        self.memory.append(message);
    }

    /// Send an event to the observer, if one is attached.
    ///
    /// Waits for channel capacity, so a slow consumer slows the run down.
    pub async fn emit(&mut self, kind: EventKind, content: impl Into<String>, metadata: Option<serde_json::Value>) {
        let Some(sink) = &self.sink else {
            return;
        };
        // Terminal events of a nested run belong to the enclosing run.
        let kind = if self.nested && kind.is_terminal() {
            EventKind::Metadata
        } else {
            kind
        };
        let mut event = AgentEvent::new(kind, content, self.step_number());
        event.metadata = metadata;
        if sink.send(event).await.is_err() {
            debug!("Event receiver dropped; detaching observer");
            self.sink = None;
        }
    }

    /// Run a tool through the registry and remember its name.
    pub async fn dispatch(&mut self, call: &ToolCall) -> Result<String, ToolError> {
        debug!(tool = %call.name, "Dispatching tool call");
        let result = self.tools.exec(&self.tool_ctx, call).await;
        if !matches!(result, Err(ToolError::NotFound(_))) {
            self.tools_used.insert(call.name.clone());
        }
        result
    }
}

/// Drives a strategy to completion.
pub struct Executor {
    strategy: Box<dyn Strategy>,
    ctx: RunContext,
    max_steps: usize,
}

impl Executor {
    pub fn new(strategy: Box<dyn Strategy>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            strategy,
            ctx: RunContext::new(tools),
            max_steps: 10,
        }
    }

    /// Nested run that reports through `sink` and never emits terminal events.
    pub(crate) fn nested(
        strategy: Box<dyn Strategy>,
        tools: Arc<ToolRegistry>,
        sink: Option<mpsc::Sender<AgentEvent>>,
        cancel: CancellationToken,
    ) -> Self {
        let mut executor = Self::new(strategy, tools).with_cancellation(cancel);
        executor.ctx.sink = sink;
        executor.ctx.nested = true;
        executor
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Seed memory with a system prompt. An empty prompt is ignored.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.is_empty() {
            self.ctx.memory = Memory::with_system_prompt(prompt);
        }
        self
    }

    /// Register the event sink.
    pub fn observe(mut self, sink: mpsc::Sender<AgentEvent>) -> Self {
        self.ctx.sink = Some(sink);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.ctx.tool_ctx.cancel = cancel;
        self
    }

    pub fn state(&self) -> ExecutorState {
        self.ctx.state
    }

    pub fn memory(&self) -> &Memory {
        &self.ctx.memory
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn tools_used(&self) -> &BTreeSet<String> {
        &self.ctx.tools_used
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.tool_ctx.cancel.clone()
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn run_id(&self) -> &str {
        self.ctx.run_id()
    }

    /// Run until the strategy finishes, the budget is spent, or the run is
    /// cancelled.
    ///
    /// Budget exhaustion is not an `Err`: an `Error` event is emitted and the
    /// last output (or [`NO_RESULTS`]) is returned.
    pub async fn run(&mut self, query: &str) -> Result<String, AgentError> {
        let started = Instant::now();
        if !query.is_empty() {
            self.ctx.push_silent(Message::user(query));
        }
        self.ctx.update_state(ExecutorState::Running);

        info!(
            run_id = %self.ctx.run_id(),
            strategy = %self.strategy.name(),
            max_steps = self.max_steps,
            "Starting run"
        );

        let cancel = self.ctx.cancel_token().clone();
        let mut last_output = String::new();

        loop {
            if cancel.is_cancelled() {
                return self.cancelled().await;
            }

            if self.ctx.step >= self.max_steps {
                self.ctx.fail();
                warn!(run_id = %self.ctx.run_id(), max_steps = self.max_steps, "Step budget exhausted");
                let output = if last_output.is_empty() {
                    NO_RESULTS.to_string()
                } else {
                    last_output
                };
                let metadata = self.summary(self.ctx.step, started);
                self.emit_at(
                    self.ctx.step,
                    EventKind::Error,
                    format!("maximum steps ({}) reached", self.max_steps),
                    Some(metadata),
                )
                .await;
                return Ok(output);
            }

            debug!(step = self.ctx.step_number(), "Executing step");
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AgentError::Cancelled),
                result = self.strategy.step(&mut self.ctx) => result,
            };

            let output = match result {
                Ok(output) => output,
                Err(AgentError::Cancelled) => return self.cancelled().await,
                Err(e) => {
                    self.ctx.fail();
                    warn!(run_id = %self.ctx.run_id(), error = %e, "Strategy failed");
                    let step = self.ctx.step_number();
                    let metadata = self.summary(step, started);
                    self.emit_at(step, EventKind::Error, e.to_string(), Some(metadata)).await;
                    return Err(e);
                }
            };

            match self.ctx.state {
                ExecutorState::Error => {
                    let step = self.ctx.step_number();
                    let metadata = self.summary(step, started);
                    self.emit_at(step, EventKind::Error, output.clone(), Some(metadata)).await;
                    return Ok(output);
                }
                ExecutorState::Finish => return Ok(self.finish(output, started).await),
                _ if has_final_answer(&output) => {
                    self.ctx.update_state(ExecutorState::Finish);
                    return Ok(self.finish(output, started).await);
                }
                _ => {}
            }

            last_output = output;
            self.ctx.step += 1;
        }
    }

    async fn finish(&mut self, output: String, started: Instant) -> String {
        let total_steps = self.ctx.step_number();
        info!(
            run_id = %self.ctx.run_id(),
            steps = total_steps,
            tools = ?self.ctx.tools_used,
            "Run finished"
        );
        let metadata = self.summary(total_steps, started);
        self.emit_at(total_steps, EventKind::Final, output.clone(), Some(metadata)).await;
        output
    }

    async fn cancelled(&mut self) -> Result<String, AgentError> {
        self.ctx.fail();
        info!(run_id = %self.ctx.run_id(), "Run cancelled");
        // A departed consumer fails the send at once; a slow one gets a bounded wait.
        if let Some(sink) = &self.ctx.sink {
            let kind = if self.ctx.nested {
                EventKind::Metadata
            } else {
                EventKind::Error
            };
            let event = AgentEvent::new(kind, AgentError::Cancelled.to_string(), self.ctx.step_number());
            if let Err(e) = sink.send_timeout(event, CANCEL_EVENT_TIMEOUT).await {
                debug!(run_id = %self.ctx.run_id(), error = %e, "Cancellation event not delivered");
            }
        }
        Err(AgentError::Cancelled)
    }

    async fn emit_at(&mut self, step: usize, kind: EventKind, content: String, metadata: Option<serde_json::Value>) {
        let saved = self.ctx.step;
        self.ctx.step = step.saturating_sub(1);
        self.ctx.emit(kind, content, metadata).await;
        self.ctx.step = saved;
    }

    fn summary(&self, total_steps: usize, started: Instant) -> serde_json::Value {
        serde_json::json!({
            "total_steps": total_steps,
            "elapsed_ms": started.elapsed().as_millis() as u64,
            "state": self.ctx.state.as_str(),
            "tools": self.ctx.tools_used.iter().collect::<Vec<_>>(),
        })
    }
}
