//! Routes tool calls to the sandbox.

use std::sync::Arc;

use serde_json::Value;

use super::invocation::{ToolInvocation, tool_schemas};
use super::{ToolOutput, ToolSchema};
use crate::sandbox::Sandbox;

/// Dispatcher bound to one sandbox.
///
/// `dispatch` never fails: unknown names, malformed arguments, sandbox
/// violations, I/O errors and even handler panics come back as
/// `ToolOutput { ok: false, .. }`.
#[derive(Clone)]
pub struct ToolDispatcher {
    sandbox: Arc<Sandbox>,
    validate_only: bool,
}

impl ToolDispatcher {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self {
            sandbox,
            validate_only: false,
        }
    }

    /// Simulate mutating calls instead of executing them.
    pub fn with_validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    pub fn is_validate_only(&self) -> bool {
        self.validate_only
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        tool_schemas()
    }

    pub async fn dispatch(&self, name: &str, arguments: Value) -> ToolOutput {
        match ToolInvocation::parse(name, arguments) {
            Ok(invocation) => self.execute(invocation).await,
            Err(err) => {
                tracing::debug!(tool = name, error = %err, "Rejected tool call");
                ToolOutput::error(err.to_string())
            }
        }
    }

    pub async fn execute(&self, invocation: ToolInvocation) -> ToolOutput {
        let name = invocation.name();
        if self.validate_only && invocation.is_mutating() {
            tracing::debug!(tool = name, "Skipping mutating tool in validate-only mode");
            return ToolOutput::skipped(name);
        }

        let sandbox = self.sandbox.clone();
        match tokio::task::spawn_blocking(move || sandbox.execute(invocation)).await {
            Ok(Ok(payload)) => ToolOutput::success(payload),
            Ok(Err(err)) => {
                tracing::debug!(tool = name, error = %err, "Tool call failed");
                ToolOutput::error(err.to_string())
            }
            Err(join_err) => {
                tracing::error!(tool = name, error = %join_err, "Tool handler crashed");
                ToolOutput::error(format!("{name} handler crashed: {join_err}"))
            }
        }
    }
}
