//! Running an executor in the background and consuming its events.
//!
//! The producer task owns the executor; events flow through a bounded channel
//! and the final result through a oneshot. The executor (and with it the event
//! sender) is dropped before the result is sent, so a consumer that drains
//! events first never misses one.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AgentError;
use crate::event::AgentEvent;
use crate::executor::Executor;

/// What a consumer sees next.
#[derive(Debug)]
pub enum RunUpdate {
    Event(AgentEvent),
    Finished(Result<String, AgentError>),
}

/// Handle to a background run. Dropping it cancels the run.
pub struct RunHandle {
    events: mpsc::Receiver<AgentEvent>,
    result: oneshot::Receiver<Result<String, AgentError>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    done: bool,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("done", &self.done)
            .finish()
    }
}

/// Start `executor` on `query` in a new task.
pub fn spawn_run(executor: Executor, query: impl Into<String>, buffer: usize) -> RunHandle {
    let (event_tx, events) = mpsc::channel(buffer.max(1));
    let (result_tx, result) = oneshot::channel();
    let cancel = executor.cancel_token();
    let query = query.into();
    let mut executor = executor.observe(event_tx);

    let task = tokio::spawn(async move {
        let outcome = executor.run(&query).await;
        drop(executor);
        if result_tx.send(outcome).is_err() {
            debug!("Run finished after its consumer went away");
        }
    });

    RunHandle {
        events,
        result,
        cancel,
        task,
        done: false,
    }
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the producer task immediately, without letting the executor
    /// report the cancellation.
    pub fn abort(&self) {
        self.cancel.cancel();
        self.task.abort();
    }

    /// Next event, or the result once every event has been delivered.
    /// Returns `None` after the result.
    pub async fn next(&mut self) -> Option<RunUpdate> {
        if self.done {
            return None;
        }
        tokio::select! {
            biased;
            Some(event) = self.events.recv() => Some(RunUpdate::Event(event)),
            result = &mut self.result => {
                self.done = true;
                Some(RunUpdate::Finished(result.unwrap_or_else(|_| {
                    Err(AgentError::Internal("run task ended without a result".into()))
                })))
            }
        }
    }

    /// Wait for the run, collecting every event.
    pub async fn collect(mut self) -> (Vec<AgentEvent>, Result<String, AgentError>) {
        let mut events = Vec::new();
        while let Some(update) = self.next().await {
            match update {
                RunUpdate::Event(event) => events.push(event),
                RunUpdate::Finished(result) => return (events, result),
            }
        }
        (events, Err(AgentError::Internal("run already consumed".into())))
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if !self.done {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::executor::{RunContext, Strategy};
    use agentloom_core::message::Message;
    use agentloom_core::tool::ToolRegistry;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Chatty {
        steps: usize,
    }

    #[async_trait]
    impl Strategy for Chatty {
        fn name(&self) -> &str {
            "chatty"
        }

        async fn step(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
            self.steps += 1;
            if self.steps == 5 {
                return Ok("Final answer: five".into());
            }
            ctx.push(Message::assistant(format!("thought {}", self.steps))).await;
            Ok(String::new())
        }
    }

    /// Never finishes on its own.
    struct Stuck;

    #[async_trait]
    impl Strategy for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn step(&mut self, _ctx: &mut RunContext) -> Result<String, AgentError> {
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn events_arrive_in_order_before_result() {
        let exec = Executor::new(Box::new(Chatty { steps: 0 }), Arc::new(ToolRegistry::new()));
        // A buffer smaller than the event count exercises back-pressure.
        let (events, result) = spawn_run(exec, "go", 1).collect().await;
        assert_eq!(result.unwrap(), "Final answer: five");

        let contents: Vec<_> = events.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["thought 1", "thought 2", "thought 3", "thought 4", "Final answer: five"]
        );
        assert_eq!(events.last().unwrap().kind, EventKind::Final);
    }

    #[tokio::test]
    async fn cancelling_ends_a_stuck_run() {
        let exec = Executor::new(Box::new(Stuck), Arc::new(ToolRegistry::new()));
        let handle = spawn_run(exec, "go", 4);
        handle.cancel();
        let (events, result) = handle.collect().await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert_eq!(events.last().unwrap().kind, EventKind::Error);
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let exec = Executor::new(Box::new(Stuck), Arc::new(ToolRegistry::new()));
        let handle = spawn_run(exec, "go", 4);
        let token = handle.cancellation_token();
        drop(handle);
        assert!(token.is_cancelled());
    }
}
