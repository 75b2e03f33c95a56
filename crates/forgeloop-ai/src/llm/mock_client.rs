//! Scripted text-generation client.
//!
//! Replays a fixed list of replies, each after an optional delay, so the
//! agent loop can be driven through turn caps, timeouts and failures
//! without a network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{AiError, Result};

use super::{CompletionRequest, CompletionResponse, LlmClient, ToolCall};

const PROVIDER: &str = "mock";

/// Reply text once the script has run out. Never the done sentinel.
pub const FALLBACK_REPLY: &str = "Still working on it.";

#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    /// Non-transient client failure.
    Error(String),
    /// Provider answered with this HTTP status.
    Http(u16),
}

#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay: Duration,
    pub reply: MockReply,
}

impl MockStep {
    fn immediate(reply: MockReply) -> Self {
        Self {
            delay: Duration::ZERO,
            reply,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::immediate(MockReply::Text(content.into()))
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self::tool_calls(vec![ToolCall::new(id, name, arguments)])
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::immediate(MockReply::ToolCalls(calls))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::immediate(MockReply::Error(message.into()))
    }

    pub fn http_status(status: u16) -> Self {
        Self::immediate(MockReply::Http(status))
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = Duration::from_millis(delay_ms);
        self
    }

    fn into_result(self) -> Result<CompletionResponse> {
        match self.reply {
            MockReply::Text(content) => Ok(CompletionResponse::text(content)),
            MockReply::ToolCalls(calls) => Ok(CompletionResponse::calls(calls)),
            MockReply::Error(message) => Err(AiError::Llm(message)),
            MockReply::Http(status) => Err(AiError::LlmHttp {
                provider: PROVIDER.to_string(),
                status,
                message: "scripted failure".to_string(),
                retry_after_secs: None,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<MockStep>,
    requests: Vec<CompletionRequest>,
}

/// Cheap to clone; clones share the script and the request log.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    model: String,
    script: Arc<Mutex<Script>>,
    started: Arc<AtomicUsize>,
    fallback_delay: Duration,
}

impl MockLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_steps(model, Vec::new())
    }

    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            model: model.into(),
            script: Arc::new(Mutex::new(Script {
                steps: steps.into(),
                requests: Vec::new(),
            })),
            ..Self::default()
        }
    }

    /// Delay before the unscripted fallback reply.
    pub fn with_fallback_delay(mut self, delay_ms: u64) -> Self {
        self.fallback_delay = Duration::from_millis(delay_ms);
        self
    }

    pub async fn push_step(&self, step: MockStep) {
        self.script.lock().await.steps.push_back(step);
    }

    /// Calls started so far, including ones cut short by a timeout.
    pub fn call_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.script.lock().await.requests.clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().await;
            script.requests.push(request);
            script.steps.pop_front()
        }
        .unwrap_or_else(|| MockStep {
            delay: self.fallback_delay,
            reply: MockReply::Text(FALLBACK_REPLY.to_string()),
        });

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FinishReason, Message};
    use serde_json::json;

    fn ping() -> CompletionRequest {
        CompletionRequest::new(vec![Message::user("ping")])
    }

    #[tokio::test]
    async fn test_replays_script_in_order() {
        let client = MockLlmClient::from_steps(
            "mock-model",
            vec![
                MockStep::tool_call("call-1", "fs_read", json!({"path": "pubspec.yaml"})),
                MockStep::text("DONE: ok"),
            ],
        );

        let first = client.complete(ping()).await.unwrap();
        assert_eq!(first.finish_reason, FinishReason::ToolCalls);
        assert_eq!(first.tool_calls[0].name, "fs_read");

        let second = client.complete(ping()).await.unwrap();
        assert_eq!(second.content.as_deref(), Some("DONE: ok"));
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.recorded_requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let client = MockLlmClient::from_steps(
            "mock-model",
            vec![MockStep::http_status(503), MockStep::error("boom")],
        );
        let err = client.complete(ping()).await.unwrap_err();
        assert!(err.is_retryable());
        let err = client.complete(ping()).await.unwrap_err();
        assert!(matches!(err, AiError::Llm(_)));
    }

    #[tokio::test]
    async fn test_falls_back_after_script() {
        let client = MockLlmClient::new("mock-model");
        let response = client.complete(ping()).await.unwrap();
        assert!(!response.requested_tools());
        assert_eq!(response.content.as_deref(), Some(FALLBACK_REPLY));
    }
}
