//! Conversation memory: the ordered message log of a single run.
//!
//! Memory is append-only within a run. The active strategy is the single
//! writer; the executor reads newly appended messages to classify them into
//! outbound events.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// Ordered sequence of messages for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Memory {
    messages: Vec<Message>,
}

impl Memory {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory seeded with a system prompt.
    ///
    /// An empty prompt leaves the memory unseeded.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let mut memory = Self::new();
        if !prompt.is_empty() {
            memory.append(Message::system(prompt));
        }
        memory
    }

    /// Append a single message.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append several messages, preserving their order.
    pub fn append_batch(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// The most recently appended message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// All messages in insertion order.
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    /// Messages appended at or after `index`.
    pub fn since(&self, index: usize) -> &[Message] {
        self.messages.get(index..).unwrap_or(&[])
    }

    /// The most recent message with the given role.
    pub fn last_with_role(&self, role: Role) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == role)
    }

    /// The first user message, which is the run's query when one was given.
    pub fn first_user(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::User)
    }

    /// Remove every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render the log as `role: content` lines.
    pub fn format_as_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_memory_starts_with_system() {
        let memory = Memory::with_system_prompt("You are helpful.");
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.all()[0].role, Role::System);
    }

    #[test]
    fn empty_prompt_leaves_memory_unseeded() {
        assert!(Memory::with_system_prompt("").is_empty());
    }

    #[test]
    fn all_returns_insertion_order() {
        let mut memory = Memory::new();
        memory.append(Message::user("one"));
        memory.append_batch(vec![Message::assistant("two"), Message::user("three")]);
        memory.append(Message::assistant("four"));

        let contents: Vec<_> = memory.all().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three", "four"]);
        assert_eq!(memory.last().unwrap().content, "four");
    }

    #[test]
    fn since_and_role_lookups() {
        let mut memory = Memory::with_system_prompt("sys");
        memory.append(Message::user("query"));
        memory.append(Message::assistant("reply"));
        memory.append(Message::user("Observation: done"));

        assert_eq!(memory.since(2).len(), 2);
        assert!(memory.since(10).is_empty());
        assert_eq!(memory.first_user().unwrap().content, "query");
        assert_eq!(memory.last_with_role(Role::Assistant).unwrap().content, "reply");
    }

    #[test]
    fn format_and_clear() {
        let mut memory = Memory::with_system_prompt("sys");
        memory.append(Message::user("hi"));
        assert_eq!(memory.format_as_text(), "system: sys\nuser: hi");

        memory.clear();
        assert!(memory.is_empty());
        assert!(memory.last().is_none());
    }
}
