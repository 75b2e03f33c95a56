//! Error types for the agent crate

use std::time::Duration;

use thiserror::Error;

/// Agent, client and sandbox error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{provider} request failed with status {status}: {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Path '{path}' escapes the project root '{root}'")]
    PathEscape { path: String, root: String },

    #[error("Refusing to touch protected path '{0}'")]
    Forbidden(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    /// Whether the failure is transient (rate limiting, server errors,
    /// dropped connections) and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::LlmHttp { status, .. } => *status == 429 || (500..600).contains(status),
            AiError::Http(err) => {
                err.is_connect()
                    || err.is_timeout()
                    || err
                        .status()
                        .is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
            }
            AiError::Timeout(_) => true,
            AiError::Llm(message) => {
                let lower = message.to_lowercase();
                lower.contains("rate limit") || lower.contains("overloaded")
            }
            _ => false,
        }
    }

    /// Server supplied `Retry-After` hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AiError::LlmHttp {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AiError>;
