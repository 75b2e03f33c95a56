//! Forgeloop AI - agentic code generation over a confined project tree
//!
//! This crate provides:
//! - A sandboxed filesystem tool executor with strict root confinement
//! - Tool dispatch for model-issued calls, with a validate-only mode
//! - An OpenAI-compatible chat client with bounded retry
//! - The agent loop: wall-clock budget, per-turn timeouts and mandatory
//!   finalization into a report and a persisted last-run record

pub mod agent;
pub mod error;
mod http_client;
pub mod llm;
pub mod sandbox;
pub mod tools;

pub use agent::{
    AgentReport, AgentRequest, AgentRunConfig, AgentRunner, ExitReason, LastRunRecord,
    Specification, ToolLogEntry,
};
pub use error::{AiError, Result};
pub use llm::{
    CompletionRequest, CompletionResponse, LlmClient, Message, MockLlmClient, MockStep,
    OpenAIClient, RetryPolicy, Role, ToolCall,
};
pub use sandbox::{Sandbox, SandboxLimits};
pub use tools::{ToolDispatcher, ToolInvocation, ToolOutput, ToolSchema};
