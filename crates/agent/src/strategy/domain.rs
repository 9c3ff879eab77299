//! Domain flavours of ReAct: same loop, a domain prompt and a tool subset
//! picked by name prefix.

use async_trait::async_trait;

use crate::error::AgentError;
use crate::executor::{RunContext, Strategy};
use crate::strategy::ToolFilter;
use crate::strategy::react::BaseReact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Elasticsearch,
    Sql,
}

impl Domain {
    /// Prompt template used for the system prompt.
    pub fn template_id(&self) -> &'static str {
        match self {
            Domain::Elasticsearch => "es",
            Domain::Sql => "sql",
        }
    }

    /// Tool name prefixes used unless the agent config overrides them.
    pub fn default_prefixes(&self) -> &'static [&'static str] {
        match self {
            Domain::Elasticsearch => &["es", "elasticsearch"],
            Domain::Sql => &["sql", "db"],
        }
    }

    /// The filter for an agent, honouring a `tool_prefixes` array in its config.
    pub fn filter(&self, config: &serde_json::Value) -> ToolFilter {
        match config.get("tool_prefixes").and_then(|v| v.as_array()) {
            Some(list) => ToolFilter::prefixes(list.iter().filter_map(|v| v.as_str())),
            None => ToolFilter::prefixes(self.default_prefixes().iter().copied()),
        }
    }
}

pub struct DomainStrategy {
    domain: Domain,
    base: BaseReact,
}

impl DomainStrategy {
    /// Wraps `base`. The base's filter is expected to come from [`Domain::filter`].
    pub fn new(domain: Domain, base: BaseReact) -> Self {
        Self { domain, base }
    }
}

#[async_trait]
impl Strategy for DomainStrategy {
    fn name(&self) -> &str {
        self.domain.template_id()
    }

    async fn step(&mut self, ctx: &mut RunContext) -> Result<String, AgentError> {
        self.base.step(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_and_configured_prefixes() {
        let es = Domain::Elasticsearch.filter(&serde_json::Value::Null);
        assert!(es.matches("es@search"));
        assert!(!es.matches("sql@query"));

        let custom = Domain::Sql.filter(&json!({"tool_prefixes": ["warehouse"]}));
        assert!(custom.matches("warehouse@query"));
        assert!(!custom.matches("sql@query"));
    }
}
