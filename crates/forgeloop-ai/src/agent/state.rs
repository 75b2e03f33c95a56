//! Agent run inputs, log entries and report

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upstream specification handed to the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Specification {
    pub name: String,
    /// Free-form structure hints (screens, modules, layout).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub structure: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Specification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_structure(mut self, structure: Value) -> Self {
        self.structure = structure;
        self
    }

    pub fn with_acceptance_criteria(mut self, criteria: Vec<String>) -> Self {
        self.acceptance_criteria = criteria;
        self
    }
}

/// Parameters of one `run_agent` call. Unset budgets fall back to the
/// runner's configuration.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub spec: Specification,
    pub dev_instructions: Option<String>,
    pub validate_only: bool,
    pub wall_clock_budget_sec: Option<f64>,
    pub per_call_timeout_sec: Option<f64>,
}

impl AgentRequest {
    pub fn new(spec: Specification) -> Self {
        Self {
            spec,
            dev_instructions: None,
            validate_only: false,
            wall_clock_budget_sec: None,
            per_call_timeout_sec: None,
        }
    }

    pub fn with_dev_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.dev_instructions = Some(instructions.into());
        self
    }

    pub fn with_validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    pub fn with_wall_clock_budget_sec(mut self, seconds: f64) -> Self {
        self.wall_clock_budget_sec = Some(seconds);
        self
    }

    pub fn with_per_call_timeout_sec(mut self, seconds: f64) -> Self {
        self.per_call_timeout_sec = Some(seconds);
        self
    }
}

/// Why the turn loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    DeclaredDone,
    TurnCap,
    BudgetExhausted,
    TurnTimeout,
    ClientError,
    Cancelled,
}

impl ExitReason {
    pub fn describe(&self) -> &'static str {
        match self {
            ExitReason::DeclaredDone => "model declared done",
            ExitReason::TurnCap => "turn cap reached",
            ExitReason::BudgetExhausted => "wall-clock budget exhausted",
            ExitReason::TurnTimeout => "turn timed out",
            ExitReason::ClientError => "text-generation call failed",
            ExitReason::Cancelled => "cancelled",
        }
    }
}

/// One entry of the run's audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolLogEntry {
    Call {
        /// `None` for calls made during finalization.
        turn: Option<usize>,
        id: String,
        name: String,
        arguments: Value,
        ok: bool,
        #[serde(default)]
        skipped: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        elapsed_ms: u64,
    },
    Timeout {
        turn: usize,
        timeout_ms: u64,
    },
    ClientError {
        turn: usize,
        message: String,
    },
    Cancelled {
        turn: usize,
    },
}

impl ToolLogEntry {
    pub fn is_call(&self) -> bool {
        matches!(self, ToolLogEntry::Call { .. })
    }
}

/// Final result of `run_agent`. Always produced, whatever the exit reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub job_id: String,
    pub summary: String,
    pub tool_log: Vec<ToolLogEntry>,
    pub diff_preview: String,
    pub exit_reason: ExitReason,
    pub turns: usize,
    pub validate_only: bool,
}

const MAX_LOGGED_STRING: usize = 200;

/// Copy of tool arguments with long strings shortened for the audit log.
pub(crate) fn abbreviate(value: &Value) -> Value {
    match value {
        Value::String(text) if text.chars().count() > MAX_LOGGED_STRING => {
            let head: String = text.chars().take(MAX_LOGGED_STRING).collect();
            Value::String(format!("{head}... [{} chars]", text.chars().count()))
        }
        Value::Array(items) => Value::Array(items.iter().map(abbreviate).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), abbreviate(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
