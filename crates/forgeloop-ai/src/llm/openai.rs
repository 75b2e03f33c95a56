//! OpenAI-compatible chat completions client

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AiError, Result};
use crate::http_client::build_http_client;
use crate::llm::client::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Message, TokenUsage, ToolCall,
};
use crate::llm::retry::{
    RetryDecision, RetryPolicy, Sleeper, TokioSleeper, response_to_error, retry_with_backoff,
};
use crate::tools::ToolSchema;

const PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "gpt-5";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for any endpoint speaking the chat completions protocol
/// (`POST {base_url}/chat/completions`, bearer auth, function tools).
pub struct OpenAIClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry_policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl OpenAIClient {
    /// An empty key yields a disabled client whose calls fail immediately
    /// without touching the network.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: build_http_client(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry_policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at another compatible service, e.g. a local inference server.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<CompletionResponse> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(response_to_error(response, PROVIDER).await);
        }
        let completion: ChatCompletion = response.json().await?;
        completion.into_response()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    /// Null for assistant turns that only requested tools.
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<EchoedCall<'a>>,
}

impl<'a> From<&'a Message> for ChatMessage<'a> {
    fn from(message: &'a Message) -> Self {
        let calls = message.tool_calls.as_deref().unwrap_or_default();
        let content = if !calls.is_empty() && message.content.is_empty() {
            None
        } else {
            Some(message.content.as_str())
        };
        Self {
            role: message.role.as_str(),
            content,
            tool_call_id: message.tool_call_id.as_deref(),
            tool_calls: calls.iter().map(EchoedCall::from).collect(),
        }
    }
}

/// A previous tool call sent back with the assistant turn that made it.
#[derive(Serialize)]
struct EchoedCall<'a> {
    id: &'a str,
    r#type: &'static str,
    function: EchoedFunction<'a>,
}

#[derive(Serialize)]
struct EchoedFunction<'a> {
    name: &'a str,
    /// The protocol carries arguments as a JSON-encoded string.
    arguments: String,
}

impl<'a> From<&'a ToolCall> for EchoedCall<'a> {
    fn from(call: &'a ToolCall) -> Self {
        let arguments = match &call.arguments {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        Self {
            id: &call.id,
            r#type: "function",
            function: EchoedFunction {
                name: &call.name,
                arguments,
            },
        }
    }
}

#[derive(Serialize)]
struct FunctionTool<'a> {
    r#type: &'static str,
    function: &'a ToolSchema,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ReplyCall>,
}

#[derive(Deserialize)]
struct ReplyCall {
    id: String,
    function: ReplyFunction,
}

#[derive(Deserialize)]
struct ReplyFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl ChatCompletion {
    fn into_response(self) -> Result<CompletionResponse> {
        let usage = self.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::Llm("completion response has no choices".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                // Unparseable arguments stay a string for the dispatcher to reject.
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments));
                ToolCall::new(call.id, call.function.name, arguments)
            })
            .collect();

        Ok(CompletionResponse {
            finish_reason: FinishReason::from_wire(
                choice.finish_reason.as_deref(),
                !tool_calls.is_empty(),
            ),
            content: choice.message.content,
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if !self.is_enabled() {
            return Err(AiError::Llm(
                "text-generation client is disabled: no API key configured".to_string(),
            ));
        }

        let body = ChatRequest {
            model: &self.model,
            messages: request.messages.iter().map(ChatMessage::from).collect(),
            tools: request
                .tools
                .iter()
                .map(|schema| FunctionTool {
                    r#type: "function",
                    function: schema,
                })
                .collect(),
            temperature: request.temperature,
        };
        tracing::debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending chat completion request"
        );

        let response = retry_with_backoff(
            &self.retry_policy,
            self.sleeper.as_ref(),
            RetryDecision::for_ai_error,
            |_| self.post(&body),
        )
        .await?;
        if let Some(usage) = response.usage {
            tracing::debug!(total_tokens = usage.total(), "Chat completion finished");
        }
        Ok(response)
    }
}
