//! Chains of nested ReAct executors.

mod common;

use agentloom_agent::test_helpers::SequentialMockProvider;
use agentloom_agent::{
    AgentError, AgentFactory, BaseReact, Chain, ChainNode, ChainStrategy, EventKind, Executor, ExecutorState,
    ReactStrategy, RunOverrides, Strategy, StrategyFactory,
};
use agentloom_config::AppConfig;
use agentloom_core::agent::{AgentDefinition, Framework};
use agentloom_core::tool::ToolRegistry;
use common::*;
use std::sync::{Arc, Mutex};

/// Plain ReAct for every node; remembers which nodes ran.
struct ReactNodes {
    provider: Arc<SequentialMockProvider>,
    ran: Mutex<Vec<String>>,
}

impl StrategyFactory for ReactNodes {
    fn node_strategy(&self, node: &ChainNode, _tools: &ToolRegistry) -> Result<(Box<dyn Strategy>, String), AgentError> {
        self.ran.lock().unwrap().push(node.name.clone());
        let strategy = ReactStrategy::new(BaseReact::new(self.provider.clone(), "mock-model"));
        Ok((Box::new(strategy), format!("You are node {}", node.name)))
    }
}

fn edge(from: &str, to: &str) -> (String, String) {
    (from.into(), to.into())
}

#[tokio::test]
async fn condition_selects_a_single_branch() {
    let provider = Arc::new(SequentialMockProvider::texts(&[
        "Action: Finish[big dog]",
        "Action: Finish[handled the big one]",
    ]));
    let nodes = Arc::new(ReactNodes {
        provider: provider.clone(),
        ran: Mutex::new(Vec::new()),
    });

    let chain = Chain::new(
        vec![
            ChainNode::new("A", Framework::React),
            ChainNode::new("B", Framework::React).with_condition(|s| s.contains("big")),
            ChainNode::new("C", Framework::React).with_condition(|s| s.contains("small")),
        ],
        vec![edge("A", "B"), edge("A", "C")],
    )
    .unwrap();

    let strategy = ChainStrategy::new(Arc::new(chain), nodes.clone());
    let exec = Executor::new(Box::new(strategy), registry(vec![]));
    let (exec, result, events) = run_collect(exec, "what size is a great dane?").await;

    assert_eq!(result.unwrap(), "handled the big one");
    assert_eq!(exec.state(), ExecutorState::Finish);
    assert_eq!(*nodes.ran.lock().unwrap(), vec!["A", "B"]);
    assert_eq!(provider.call_count(), 2);

    // B received A's output as its query
    let b_request = &provider.requests()[1];
    assert_eq!(b_request.messages[0].content, "You are node B");
    assert_eq!(b_request.messages[1].content, "big dog");

    // nested runs never end the outer stream
    assert_eq!(count(&events, EventKind::Final), 1);
    assert_eq!(events.last().unwrap().kind, EventKind::Final);
    assert!(events.iter().any(|e| e.kind == EventKind::Metadata && e.content == "Final answer: big dog"));
}

#[tokio::test]
async fn every_accepting_branch_runs_in_declared_order() {
    let provider = Arc::new(SequentialMockProvider::texts(&[
        "Action: Finish[ dog ]",
        "Action: Finish[from B]",
        "Action: Finish[from C]",
    ]));
    let nodes = Arc::new(ReactNodes {
        provider: provider.clone(),
        ran: Mutex::new(Vec::new()),
    });

    let chain = Chain::new(
        vec![
            ChainNode::new("A", Framework::React).with_transform(|s| format!("<{}>", s.trim())),
            ChainNode::new("B", Framework::React).with_condition(|s| s.contains("dog")),
            ChainNode::new("C", Framework::React).with_condition(|s| s.starts_with('<')),
        ],
        vec![edge("A", "B"), edge("A", "C")],
    )
    .unwrap();

    let exec = Executor::new(Box::new(ChainStrategy::new(Arc::new(chain), nodes.clone())), registry(vec![]));
    let (_, result, events) = run_collect(exec, "describe a dog").await;

    assert_eq!(*nodes.ran.lock().unwrap(), vec!["A", "B", "C"]);
    assert_eq!(result.unwrap(), "from C");

    // both branches see A's transformed output
    let requests = provider.requests();
    assert_eq!(requests[1].messages[0].content, "You are node B");
    assert_eq!(requests[1].messages[1].content, "<dog>");
    assert_eq!(requests[2].messages[0].content, "You are node C");
    assert_eq!(requests[2].messages[1].content, "<dog>");

    assert_eq!(count(&events, EventKind::Final), 1);
}

#[tokio::test]
async fn transform_feeds_successor_and_condition() {
    let provider = Arc::new(SequentialMockProvider::texts(&[
        "Action: Finish[  fido  ]",
        "Action: Finish[done with FIDO]",
    ]));
    let nodes = Arc::new(ReactNodes {
        provider: provider.clone(),
        ran: Mutex::new(Vec::new()),
    });

    let chain = Chain::new(
        vec![
            ChainNode::new("name", Framework::React).with_transform(|s| s.trim().to_uppercase()),
            ChainNode::new("greet", Framework::React).with_condition(|s| s == "FIDO"),
        ],
        vec![edge("name", "greet")],
    )
    .unwrap();

    let exec = Executor::new(Box::new(ChainStrategy::new(Arc::new(chain), nodes.clone())), registry(vec![]));
    let (_, result, _) = run_collect(exec, "name the dog").await;

    assert_eq!(result.unwrap(), "done with FIDO");
    assert_eq!(provider.requests()[1].messages[1].content, "FIDO");
}

#[tokio::test]
async fn declarative_chain_through_the_factory() {
    let provider = Arc::new(SequentialMockProvider::texts(&[
        "Action: Finish[small dog]",
        "Action: Finish[a lap dog]",
    ]));
    let agent = AgentDefinition::new("sizer", Framework::Chain)
        .with_system_prompt("You classify dogs.")
        .with_config(serde_json::json!({
            "chain": {
                "nodes": [
                    {"name": "classify", "strategy": "react"},
                    {"name": "big", "condition": {"contains": "big"}},
                    {"name": "small", "condition": {"contains": "small"},
                     "transform": {"template": "Small breed: {{.Input}}"}}
                ],
                "edges": [["classify", "big"], ["classify", "small"]]
            }
        }));

    let factory = AgentFactory::new(provider.clone(), &AppConfig::default()).with_tools(registry(vec![]));
    let exec = factory.build(&agent, &RunOverrides::default()).await.unwrap();
    let (_, result, _) = run_collect(exec, "chihuahua").await;

    assert_eq!(result.unwrap(), "Small breed: a lap dog");
    assert_eq!(provider.call_count(), 2);

    let small_system = &provider.requests()[1].messages[0].content;
    assert!(small_system.contains("You classify dogs."));
    assert!(small_system.contains("\"small\" stage"));
}
