//! Tool surface exposed to the coder model
//!
//! Every tool operates on the project sandbox. Calls arrive as raw
//! `(name, arguments)` pairs, are validated into a [`ToolInvocation`], and
//! always come back as a [`ToolOutput`].

mod dispatcher;
mod invocation;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub use dispatcher::ToolDispatcher;
pub use invocation::{
    FsDeleteArgs, FsDiffArgs, FsGlobArgs, FsMapArgs, FsMkdirArgs, FsPatchArgs, FsReadArgs,
    FsWriteArgs, PatchEdit, TOOL_NAMES, ToolInvocation, WriteMode, tool_schemas,
};

/// JSON Schema for tool parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub ok: bool,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when a mutating call was only simulated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl ToolOutput {
    pub fn success(payload: Value) -> Self {
        Self {
            ok: true,
            payload,
            error: None,
            skipped: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: Value::Null,
            error: Some(message.into()),
            skipped: false,
        }
    }

    /// Simulated success for a mutating call in validate-only mode.
    pub fn skipped(tool: &str) -> Self {
        Self {
            ok: true,
            payload: json!({ "skipped": true, "tool": tool, "reason": "validate_only" }),
            error: None,
            skipped: true,
        }
    }

    /// Serialized form handed back to the model as the tool message.
    pub fn to_message_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            json!({ "ok": self.ok, "error": self.error }).to_string()
        })
    }
}
