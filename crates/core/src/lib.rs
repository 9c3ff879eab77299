//! # agentloom core
//!
//! Domain types, traits, and error definitions for the agentloom runtime.
//! This crate has no framework dependencies; every other crate depends
//! inward on it.
//!
//! - [`message`] / [`memory`]: the per-run conversation log
//! - [`tool`]: tool trait, descriptors and the inheriting registry
//! - [`provider`]: the chat client contract
//! - [`prompt`]: the template engine and process-wide catalogue
//! - [`agent`]: stored agent definitions

pub mod agent;
pub mod error;
pub mod memory;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentDefinition, AgentStore, Framework, InMemoryAgentStore};
pub use error::{Error, Result};
pub use memory::Memory;
pub use message::{Message, MessageToolCall, Role};
pub use prompt::{PromptTemplate, TemplateCatalogue};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{
    FnTool, NAMESPACE_SEP, Tool, ToolCall, ToolContext, ToolDescriptor, ToolKind, ToolRegistry,
};
