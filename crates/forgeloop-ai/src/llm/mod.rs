//! Text-generation client abstraction
//!
//! Supports any OpenAI-compatible chat completions endpoint plus a scripted
//! mock used to drive the agent loop deterministically in tests.

mod client;
mod mock_client;
mod openai;
pub mod retry;

pub use client::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Message, Role, TokenUsage,
    ToolCall,
};
pub use mock_client::{FALLBACK_REPLY, MockLlmClient, MockReply, MockStep};
pub use openai::OpenAIClient;
pub use retry::{RetryDecision, RetryPolicy, Sleeper, TokioSleeper, retry_with_backoff};
