//! Plan-and-execute runs against a scripted chat client.

mod common;

use agentloom_agent::strategy::plan::PlanOptions;
use agentloom_agent::test_helpers::SequentialMockProvider;
use agentloom_agent::{AgentEvent, EventKind, Executor, ExecutorState, PlanStrategy};
use agentloom_core::error::ToolError;
use common::*;
use std::sync::Arc;

const TWO_STEP_PLAN: &str = r#"Here is the plan:
{
  "goal": "Find the weight in kg",
  "steps": [
    {"id": 1, "description": "Look up the weight", "tool": "lookup", "input": "Border Collie", "dependencies": []},
    {"id": 2, "description": "Convert to kg", "tool": "convert", "input": "${step.1} to kg", "dependencies": [1]}
  ]
}"#;

fn plan_strategy(provider: Arc<SequentialMockProvider>, enable_replan: bool, max_replans: usize) -> Box<PlanStrategy> {
    let options = PlanOptions {
        enable_replan,
        max_replans,
        preview_chars: 200,
    };
    Box::new(PlanStrategy::new(provider, "mock-model").with_options(options))
}

/// The plan carried by the last metadata event.
fn last_plan(events: &[AgentEvent]) -> serde_json::Value {
    events
        .iter()
        .rev()
        .find_map(|e| e.metadata.as_ref().and_then(|m| m.get("plan")).cloned())
        .expect("a plan metadata event")
}

#[tokio::test]
async fn executes_steps_in_dependency_order_and_summarises() {
    let (lookup, lookup_calls) = recording_tool("lookup", |_| Ok("37 lbs".into()));
    let (convert, convert_calls) = recording_tool("convert", |_| Ok("16.8 kg".into()));
    let provider = Arc::new(SequentialMockProvider::texts(&[
        TWO_STEP_PLAN,
        "A Border Collie weighs about 16.8 kg.",
    ]));

    let exec = Executor::new(plan_strategy(provider.clone(), true, 3), registry(vec![lookup, convert])).with_max_steps(50);
    let (exec, result, events) = run_collect(exec, "How many kg is a Border Collie?").await;

    assert_eq!(result.unwrap(), "A Border Collie weighs about 16.8 kg.");
    assert_eq!(exec.state(), ExecutorState::Finish);
    assert_eq!(lookup_calls.inputs(), vec!["Border Collie"]);
    assert_eq!(convert_calls.inputs(), vec!["37 lbs to kg"]);
    assert_eq!(provider.call_count(), 2);

    let final_event = events.last().unwrap();
    assert_eq!(final_event.kind, EventKind::Final);
    assert_eq!(final_event.content, "A Border Collie weighs about 16.8 kg.");

    let plan = last_plan(&events);
    assert_eq!(plan["status"], "completed");
    assert_eq!(plan["steps"][1]["result"], "16.8 kg");

    let thinking: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::Thinking)
        .map(|e| e.content.as_str())
        .collect();
    assert!(thinking.contains(&"Completed step 1: Look up the weight"));
    assert!(thinking.contains(&"Completed step 2: Convert to kg"));
    assert!(events.iter().any(|e| e.kind == EventKind::Observation && e.content == "Result: 37 lbs"));

    // the summary request carries the step results
    let requests = provider.requests();
    let summary_prompt = &requests[1].messages.last().unwrap().content;
    assert!(summary_prompt.contains("Convert to kg"));
    assert!(summary_prompt.contains("16.8 kg"));
}

#[tokio::test]
async fn failed_step_without_replan_fails_the_plan() {
    let (lookup, _) = recording_tool("lookup", |_| {
        Err(ToolError::ExecutionFailed {
            tool_name: "lookup".into(),
            reason: "service down".into(),
        })
    });
    let (convert, convert_calls) = recording_tool("convert", |_| Ok("never".into()));
    let provider = Arc::new(SequentialMockProvider::texts(&[TWO_STEP_PLAN]));

    let exec = Executor::new(plan_strategy(provider.clone(), false, 3), registry(vec![lookup, convert]));
    let (exec, result, events) = run_collect(exec, "How many kg?").await;

    assert!(result.unwrap().contains("service down"));
    assert_eq!(exec.state(), ExecutorState::Error);
    assert_eq!(convert_calls.count(), 0);
    assert_eq!(provider.call_count(), 1);

    assert_eq!(events.last().unwrap().kind, EventKind::Error);
    assert_eq!(count(&events, EventKind::Final), 0);

    let plan = last_plan(&events);
    assert_eq!(plan["status"], "failed");
    assert_eq!(plan["steps"][0]["status"], "failed");
    assert_eq!(plan["steps"][1]["status"], "pending");
}

#[tokio::test]
async fn replanning_recovers_from_a_failed_step() {
    let (lookup, _) = recording_tool("lookup", |_| Err(ToolError::InvalidInput("unknown breed".into())));
    let (search, search_calls) = recording_tool("search", |_| Ok("about 17 kg".into()));
    let provider = Arc::new(SequentialMockProvider::texts(&[
        r#"{"goal": "weigh", "steps": [{"id": 1, "description": "look up", "tool": "lookup", "input": "collie"}]}"#,
        r#"{"goal": "ignored", "steps": [{"id": 1, "description": "search the web", "tool": "search", "input": "collie weight"}]}"#,
        "About 17 kg.",
    ]));

    let exec = Executor::new(plan_strategy(provider.clone(), true, 3), registry(vec![lookup, search]));
    let (_, result, events) = run_collect(exec, "weigh a collie").await;

    assert_eq!(result.unwrap(), "About 17 kg.");
    assert_eq!(search_calls.inputs(), vec!["collie weight"]);

    let requests = provider.requests();
    let replan_prompt = &requests[1].messages.last().unwrap().content;
    assert!(replan_prompt.contains("Step 1 [failed]: look up - error: Invalid tool input: unknown breed"));

    // goal survives replanning
    let plan = last_plan(&events);
    assert_eq!(plan["goal"], "weigh");
    assert_eq!(plan["status"], "completed");
}

#[tokio::test]
async fn exhausted_replans_fail_the_plan() {
    let (lookup, lookup_calls) = recording_tool("lookup", |_| Err(ToolError::InvalidInput("nope".into())));
    let plan = r#"{"goal": "g", "steps": [{"id": 1, "description": "try", "tool": "lookup", "input": "x"}]}"#;
    let provider = Arc::new(SequentialMockProvider::texts(&[plan, plan]));

    let exec = Executor::new(plan_strategy(provider.clone(), true, 1), registry(vec![lookup]));
    let (exec, _, events) = run_collect(exec, "q").await;

    assert_eq!(exec.state(), ExecutorState::Error);
    assert_eq!(lookup_calls.count(), 2);
    assert_eq!(provider.call_count(), 2);
    assert_eq!(last_plan(&events)["status"], "failed");
}

#[tokio::test]
async fn unparseable_plan_is_reported_and_retried() {
    let (tool, _) = recording_tool("noop", |_| Ok("done".into()));
    let provider = Arc::new(SequentialMockProvider::texts(&[
        "I cannot make a plan.",
        r#"{"goal": "g", "steps": [{"id": 1, "description": "noop", "tool": "noop"}]}"#,
        "All done.",
    ]));
    let exec = Executor::new(plan_strategy(provider, true, 3), registry(vec![tool]));
    let (_, result, events) = run_collect(exec, "q").await;

    assert_eq!(result.unwrap(), "All done.");
    assert!(events[0].content.starts_with("Failed to parse plan:"));
}

#[tokio::test]
async fn cyclic_plan_is_rejected() {
    let provider = Arc::new(SequentialMockProvider::repeating(
        r#"{"goal": "g", "steps": [
            {"id": 1, "description": "a", "tool": "t", "dependencies": [2]},
            {"id": 2, "description": "b", "tool": "t", "dependencies": [1]}
        ]}"#,
    ));
    let exec = Executor::new(plan_strategy(provider, true, 3), registry(vec![])).with_max_steps(2);
    let (exec, _, events) = run_collect(exec, "q").await;

    assert_eq!(exec.state(), ExecutorState::Error);
    assert!(events[0].content.contains("cycle"));
}
