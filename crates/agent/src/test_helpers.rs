//! Scripted chat clients for tests in this and downstream crates.

use agentloom_core::error::ProviderError;
use agentloom_core::message::{Message, MessageToolCall};
use agentloom_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock, recovering from poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue. Panics if
/// more calls are made than responses provided, unless a repeating response
/// was configured with [`SequentialMockProvider::repeating`].
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    repeat: Option<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with each text in order.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| make_text_response(t)).collect())
    }

    /// Replies with `text` forever.
    pub fn repeating(text: &str) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            repeat: Some(make_text_response(text)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failure as the next scripted outcome.
    pub fn then_error(self, error: ProviderError) -> Self {
        lock(&self.responses).push(Err(error));
        self
    }

    pub fn then_text(self, text: &str) -> Self {
        lock(&self.responses).push(Ok(make_text_response(text)));
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = lock(&self.requests);
            requests.push(request);
            requests.len()
        };
        let mut responses = lock(&self.responses);
        if responses.is_empty() {
            return match &self.repeat {
                Some(response) => Ok(response.clone()),
                None => panic!("SequentialMockProvider: no more responses (call #{call})"),
            };
        }
        responses.remove(0)
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut message = Message::assistant(thought);
    message.tool_calls = tool_calls;
    ProviderResponse {
        message,
        usage: None,
        model: "mock-model".into(),
    }
}
