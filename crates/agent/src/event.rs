//! Run events streamed to the caller.
//!
//! Every message a strategy appends to memory is classified into an event at
//! the moment it is appended, so memory order and event order are the same.
//! Each run ends with exactly one `Final` or `Error` event.

use agentloom_core::message::{Message, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Thinking,
    Action,
    Observation,
    Metadata,
    Final,
    Error,
}

impl EventKind {
    /// Wire name, also used as the SSE event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Thinking => "thinking",
            EventKind::Action => "action",
            EventKind::Observation => "observation",
            EventKind::Metadata => "metadata",
            EventKind::Final => "final",
            EventKind::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Final | EventKind::Error)
    }

    /// The event a newly appended memory message produces, if any.
    ///
    /// An assistant reply that contains an action is an `Action` even when it
    /// also carries a `Thought:`.
    pub fn classify(message: &Message) -> Option<EventKind> {
        match message.role {
            Role::System => None,
            Role::Assistant if message.content.contains("Action:") => Some(EventKind::Action),
            Role::Assistant if !message.tool_calls.is_empty() => Some(EventKind::Action),
            Role::Assistant => Some(EventKind::Thinking),
            Role::User | Role::Tool => Some(EventKind::Observation),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub kind: EventKind,
    pub content: String,
    /// 1-based step during which the event was emitted
    pub step: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AgentEvent {
    pub fn new(kind: EventKind, content: impl Into<String>, step: usize) -> Self {
        Self {
            kind,
            content: content.into(),
            step,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
