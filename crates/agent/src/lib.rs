//! The agent execution engine.
//!
//! An [`Executor`] owns a run's memory, state and step budget and drives a
//! [`Strategy`] one step at a time:
//!
//! 1. **Seed** memory with the system prompt and the user query
//! 2. **Step** the strategy: chat, parse actions, dispatch tools, observe
//! 3. **Emit** every appended message as an [`AgentEvent`]
//! 4. **Stop** on a final answer, a strategy-declared finish or failure, the
//!    step budget, or cancellation
//!
//! Strategies: ReAct (and its Elasticsearch/SQL flavours), plan-and-execute
//! with replanning, and chains of nested executors.

pub mod error;
pub mod event;
pub mod executor;
pub mod factory;
pub mod parser;
pub mod strategy;
pub mod stream;
pub mod test_helpers;

pub use error::{AgentError, ChainError, PlanError};
pub use event::{AgentEvent, EventKind};
pub use executor::{Executor, ExecutorState, NO_RESULTS, RunContext, Strategy};
pub use factory::{AgentFactory, RunOverrides, RunRequest};
pub use strategy::{
    BaseReact, Chain, ChainNode, ChainSpec, ChainStrategy, Domain, DomainStrategy, Plan, PlanStatus, PlanStep,
    PlanStrategy, ReactStrategy, StepStatus, StrategyFactory, ToolFilter,
};
pub use stream::{RunHandle, RunUpdate, spawn_run};
