//! HTTP GET tool backed by `reqwest`.
//!
//! The response body is truncated so a single observation cannot flood the
//! conversation. The request races the run's cancellation token.

use agentloom_core::error::ToolError;
use agentloom_core::tool::{Tool, ToolContext};
use async_trait::async_trait;
use std::time::Duration;

use crate::{field_or_text, parse_input};

const DEFAULT_MAX_BYTES: usize = 8 * 1024;

pub struct HttpGetTool {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpGetTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "http_get".into(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| failed(e.to_string()))?;

        if !status.is_success() {
            return Err(failed(format!("HTTP {status}: {}", truncate(&body, 200))));
        }
        Ok(truncate(&body, self.max_bytes))
    }
}

impl Default for HttpGetTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http_get"
    }

    fn description(&self) -> &str {
        "Fetch a URL with HTTP GET and return the response body. Input: the URL, or {\"url\": ...}."
    }

    fn parameters_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "http:// or https:// URL" }
            },
            "required": ["url"]
        }))
    }

    async fn execute(&self, ctx: &ToolContext, input: &str) -> Result<String, ToolError> {
        let args = parse_input(input);
        let url = field_or_text(&args, "url")
            .map(|u| u.trim().to_string())
            .unwrap_or_default();
        validate_url(&url)?;

        tracing::debug!(url = %url, run_id = %ctx.run_id, "http_get");
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled(self.name().into())),
            result = self.fetch(&url) => result,
        }
    }
}

fn validate_url(url: &str) -> Result<(), ToolError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ToolError::InvalidInput(
            "URL must start with http:// or https://".into(),
        ))
    }
}

/// Truncate to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &text[..end])
}
