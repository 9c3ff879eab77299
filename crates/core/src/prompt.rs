//! Prompt template engine.
//!
//! Templates are plain text with `{{.Name}}` placeholders. The special
//! `{{.Examples}}` placeholder receives the template's few-shot examples.
//! A process-wide catalogue holds the built-in templates; it is set once at
//! startup and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::PromptError;

/// Placeholder that receives rendered examples.
pub const EXAMPLES_VAR: &str = "Examples";

/// A named, parameterised prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub description: String,
    pub body: String,
    /// Names of the placeholders the body expects (documentation only)
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>, description: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            body: body.into(),
            variables: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_variables(mut self, variables: &[&str]) -> Self {
        self.variables = variables.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Substitute bindings into the body. Missing bindings render as empty.
    pub fn render(&self, bindings: &HashMap<String, String>) -> String {
        let examples = self
            .examples
            .iter()
            .enumerate()
            .map(|(i, e)| format!("Example {}:\n{}", i + 1, e.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        substitute(&self.body, |name| {
            if name == EXAMPLES_VAR {
                bindings.get(name).cloned().unwrap_or_else(|| examples.clone())
            } else {
                bindings.get(name).cloned().unwrap_or_default()
            }
        })
    }
}

/// Replace every `{{.Name}}` token using `lookup`.
///
/// Text that looks like a token but is not well formed is copied unchanged.
fn substitute(body: &str, lookup: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let inner = after[..end].trim();
        match inner.strip_prefix('.') {
            Some(name) if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') => {
                out.push_str(&lookup(name));
            }
            _ => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// A collection of templates addressable by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalogue {
    templates: HashMap<String, PromptTemplate>,
}

impl TemplateCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalogue pre-loaded with the built-in agent templates.
    pub fn with_builtins() -> Self {
        let mut catalogue = Self::new();
        for template in builtin_templates() {
            catalogue.templates.insert(template.id.clone(), template);
        }
        catalogue
    }

    pub fn register(&mut self, template: PromptTemplate) -> Result<(), PromptError> {
        if self.templates.contains_key(&template.id) {
            return Err(PromptError::Duplicate(template.id));
        }
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&PromptTemplate, PromptError> {
        self.templates
            .get(id)
            .ok_or_else(|| PromptError::NotFound(id.to_string()))
    }

    /// Render template `id` with the given bindings.
    pub fn build<K, V>(&self, id: &str, bindings: impl IntoIterator<Item = (K, V)>) -> Result<String, PromptError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let bindings: HashMap<String, String> = bindings
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Ok(self.get(id)?.render(&bindings))
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

static GLOBAL: OnceLock<TemplateCatalogue> = OnceLock::new();

/// Install the process-wide catalogue. Fails if it was already set or read.
pub fn install_global(catalogue: TemplateCatalogue) -> Result<(), TemplateCatalogue> {
    GLOBAL.set(catalogue)
}

/// The process-wide catalogue, defaulting to the built-ins on first read.
pub fn global() -> &'static TemplateCatalogue {
    GLOBAL.get_or_init(TemplateCatalogue::with_builtins)
}

fn builtin_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new("react", "Thought/Action/Observation loop", REACT_BODY)
            .with_variables(&["SystemPrompt", "Tools", "Examples"])
            .with_example(REACT_EXAMPLE),
        PromptTemplate::new("es", "Elasticsearch analyst", ES_BODY)
            .with_variables(&["SystemPrompt", "Tools", "Examples"])
            .with_example(ES_EXAMPLE),
        PromptTemplate::new("sql", "SQL analyst", SQL_BODY)
            .with_variables(&["SystemPrompt", "Tools", "Examples"])
            .with_example(SQL_EXAMPLE),
        PromptTemplate::new("plan", "Generate a JSON execution plan", PLAN_BODY)
            .with_variables(&["Query", "Tools"]),
        PromptTemplate::new("replan", "Revise a plan after failures", REPLAN_BODY)
            .with_variables(&["Goal", "Status", "Tools"]),
        PromptTemplate::new("summary", "Summarise completed plan steps", SUMMARY_BODY)
            .with_variables(&["Goal", "Results"]),
        PromptTemplate::new("chain", "One stage of a chain", CHAIN_BODY)
            .with_variables(&["SystemPrompt", "Node"]),
    ]
}

const REACT_BODY: &str = "{{.SystemPrompt}}

Answer the question by interleaving Thought, Action and Observation steps.
Use this format:

Thought: reason about what to do next
Action: toolName[input]

You will then receive:
Observation: the tool result

When you know the answer, reply with:
Thought: I know the final answer
Action: Finish[the answer]

Available tools:
{{.Tools}}

{{.Examples}}";

const REACT_EXAMPLE: &str = "Question: How much does a toy poodle weigh?
Thought: I should look up the average weight of the breed.
Action: averageDogWeight[Toy Poodle]
Observation: a toy poodle weighs 7 lbs on average
Thought: I know the final answer
Action: Finish[7 lbs]";

const ES_BODY: &str = "{{.SystemPrompt}}

You are an Elasticsearch analyst. Inspect index mappings before querying and
build queries with the Query DSL. Interleave Thought and Action steps:

Thought: reason about the data you need
Action: toolName[input]

When you have the answer reply with Action: Finish[the answer].

Available tools:
{{.Tools}}

{{.Examples}}";

const ES_EXAMPLE: &str = "Question: How many error logs were written today?
Thought: I need the mapping of the logs index first.
Action: es@get_mapping[{\"index\": \"logs\"}]
Observation: {\"level\": \"keyword\", \"@timestamp\": \"date\"}
Thought: Now count documents with level=error since midnight.
Action: es@count[{\"index\": \"logs\", \"query\": {\"term\": {\"level\": \"error\"}}}]
Observation: 42
Action: Finish[42 error logs]";

const SQL_BODY: &str = "{{.SystemPrompt}}

You are a SQL analyst. List tables and describe their schema before writing a
query. Only issue read-only statements. Interleave Thought and Action steps:

Thought: reason about the data you need
Action: toolName[input]

When you have the answer reply with Action: Finish[the answer].

Available tools:
{{.Tools}}

{{.Examples}}";

const SQL_EXAMPLE: &str = "Question: How many customers are there?
Thought: I should check which tables exist.
Action: sql@list_tables[]
Observation: customers, orders
Action: sql@query[SELECT COUNT(*) FROM customers]
Observation: 118
Action: Finish[118 customers]";

const PLAN_BODY: &str = "You are a planner. Break the user's request into steps that can each be
solved with exactly one tool.

Request: {{.Query}}

Available tools:
{{.Tools}}

Reply with a single JSON object and nothing else:
{\"goal\": \"...\", \"steps\": [{\"id\": 1, \"description\": \"...\", \"tool\": \"toolName\", \"input\": \"...\", \"dependencies\": []}]}

A step may use the result of an earlier step by writing ${step.N} in its
input, and must then list N in its dependencies.";

const REPLAN_BODY: &str = "The current plan for the goal below could not be completed.

Goal: {{.Goal}}

Step status:
{{.Status}}

Available tools:
{{.Tools}}

Produce a revised plan as a single JSON object with the same shape:
{\"goal\": \"...\", \"steps\": [{\"id\": 1, \"description\": \"...\", \"tool\": \"toolName\", \"input\": \"...\", \"dependencies\": []}]}";

const SUMMARY_BODY: &str = "Goal: {{.Goal}}

The following steps were completed:
{{.Results}}

Write a concise final answer to the goal using these results.";

const CHAIN_BODY: &str = "{{.SystemPrompt}}

You are the \"{{.Node}}\" stage of a processing chain. Work only on the input
you receive and reply with your result for the next stage.";
