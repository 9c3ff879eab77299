//! Reasoning strategies driven by the [`Executor`](crate::executor::Executor).

pub mod chain;
pub mod domain;
pub mod plan;
pub mod react;

use agentloom_core::tool::{ToolKind, ToolRegistry};

pub use chain::{Chain, ChainNode, ChainSpec, ChainStrategy, StrategyFactory};
pub use domain::{Domain, DomainStrategy};
pub use plan::{Plan, PlanStatus, PlanStep, PlanStrategy, StepStatus};
pub use react::{BaseReact, ReactStrategy};

/// Restricts which tools a strategy advertises to the model.
///
/// An empty prefix list allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    prefixes: Vec<String>,
}

impl ToolFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, tool_name: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| tool_name.starts_with(p.as_str()))
    }
}

/// One `- name: description` line per tool of `kind` that passes `filter`.
pub fn describe_tools(registry: &ToolRegistry, filter: &ToolFilter, kind: Option<ToolKind>) -> String {
    let lines: Vec<String> = registry
        .available()
        .into_iter()
        .filter(|d| kind.is_none_or(|k| d.kind == k))
        .filter(|d| filter.matches(&d.name))
        .map(|d| format!("- {}: {}", d.name, d.description))
        .collect();
    if lines.is_empty() {
        "(no tools available)".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloom_core::FnTool;
    use std::sync::Arc;

    #[test]
    fn filter_matching() {
        assert!(ToolFilter::all().matches("anything"));
        let filter = ToolFilter::prefixes(["es", "elasticsearch"]);
        assert!(filter.matches("es@search"));
        assert!(filter.matches("elasticsearch_query"));
        assert!(!filter.matches("sql@query"));
    }

    #[test]
    fn tool_descriptions() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new("b_tool", "second", |_| Ok(String::new()))));
        registry.register(Arc::new(FnTool::new("a_tool", "first", |_| Ok(String::new()))));
        let text = describe_tools(&registry, &ToolFilter::all(), Some(ToolKind::Local));
        assert_eq!(text, "- a_tool: first\n- b_tool: second");

        let none = describe_tools(&registry, &ToolFilter::all(), Some(ToolKind::Remote));
        assert_eq!(none, "(no tools available)");
    }
}
