//! `agentloom run`: Run one query against a configured agent.
//!
//! Events are printed as they stream; the final result goes to stdout last.

use agentloom_agent::{AgentEvent, AgentFactory, EventKind, RunRequest, RunUpdate, spawn_run};
use agentloom_core::agent::InMemoryAgentStore;
use std::path::Path;
use std::sync::Arc;

pub async fn run(
    config_path: Option<&Path>,
    agent_id: String,
    query: String,
    model: Option<String>,
    max_steps: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    let providers = agentloom_providers::build_from_config(&config)?;
    let provider = providers.default().ok_or("No default provider configured")?;

    let store = InMemoryAgentStore::new(config.agents.iter().cloned());
    let factory = AgentFactory::new(provider, &config);

    let mut request = RunRequest::new(agent_id, query);
    request.overrides.model = model;
    request.overrides.max_steps = max_steps;

    let executor = factory.for_request(&store, &request).await?;
    let mut handle = spawn_run(executor, request.query.clone(), config.runtime.event_buffer);

    // Ctrl+C cancels the run; the executor reports the cancellation itself.
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    while let Some(update) = handle.next().await {
        match update {
            RunUpdate::Event(event) => eprintln!("{}", render(&event)),
            RunUpdate::Finished(Ok(answer)) => {
                println!("{answer}");
                return Ok(());
            }
            RunUpdate::Finished(Err(e)) => return Err(e.into()),
        }
    }

    Ok(())
}

/// One line per event, continuation lines indented under the label.
fn render(event: &AgentEvent) -> String {
    let label = match event.kind {
        EventKind::Thinking => "thinking",
        EventKind::Action => "action",
        EventKind::Observation => "observe",
        EventKind::Metadata => "meta",
        EventKind::Final => "final",
        EventKind::Error => "error",
    };
    let prefix = format!("[{:>2}] {label:<8} ", event.step);
    let indent = " ".repeat(prefix.len());
    let mut out = String::new();
    for (i, line) in event.content.trim().lines().enumerate() {
        if i == 0 {
            out.push_str(&prefix);
        } else {
            out.push('\n');
            out.push_str(&indent);
        }
        out.push_str(line);
    }
    if out.is_empty() {
        out = prefix.trim_end().to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_multiline_events_indented() {
        let event = AgentEvent::new(EventKind::Action, "Thought: look\nAction: lookup[x]", 2);
        assert_eq!(render(&event), "[ 2] action   Thought: look\n              Action: lookup[x]");
    }

    #[test]
    fn renders_empty_content() {
        let event = AgentEvent::new(EventKind::Final, "", 3);
        assert_eq!(render(&event), "[ 3] final");
    }
}
