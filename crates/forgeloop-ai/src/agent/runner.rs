//! Bounded tool-using conversation loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use forgeloop_progress::{JobProgress, ProgressBus};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::budget::RunBudget;
use super::config::AgentRunConfig;
use super::last_run::LastRunRecord;
use super::prompt::{CONTINUE_PROMPT, is_done_sentinel, seed_messages};
use super::state::{AgentReport, AgentRequest, ExitReason, ToolLogEntry, abbreviate};
use crate::llm::{CompletionRequest, LlmClient, Message, ToolCall};
use crate::sandbox::Sandbox;
use crate::tools::{ToolDispatcher, ToolOutput};

const PROGRESS_BOOT: f64 = 0.05;
const PROGRESS_FIRST_TURN: f64 = 0.12;
const PROGRESS_DECLARED_DONE: f64 = 0.92;
const PROGRESS_FINALIZE: f64 = 0.95;
const PROGRESS_AGENT_DONE: f64 = 0.98;

/// Mutable state of one run. Owned by the loop, dropped after finalization.
struct RunState {
    messages: Vec<Message>,
    tool_log: Vec<ToolLogEntry>,
    turns: usize,
    last_diff: Option<String>,
    final_text: Option<String>,
}

impl RunState {
    fn call_count(&self) -> usize {
        self.tool_log.iter().filter(|e| e.is_call()).count()
    }
}

/// Drives the coder model against the sandbox under a wall-clock budget.
pub struct AgentRunner {
    llm: Arc<dyn LlmClient>,
    sandbox: Arc<Sandbox>,
    progress: ProgressBus,
    config: AgentRunConfig,
    cancel: CancellationToken,
}

impl AgentRunner {
    pub fn new(llm: Arc<dyn LlmClient>, sandbox: Arc<Sandbox>, progress: ProgressBus) -> Self {
        Self {
            llm,
            sandbox,
            progress,
            config: AgentRunConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: AgentRunConfig) -> Self {
        self.config = config;
        self
    }

    /// Token checked before every turn; cancelling also aborts an in-flight call.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &AgentRunConfig {
        &self.config
    }

    /// Run one agent job. Never fails: every failure mode ends in
    /// finalization and a report.
    pub async fn run_agent(&self, request: AgentRequest) -> AgentReport {
        let job_id = Uuid::new_v4().to_string();
        let job = JobProgress::new(self.progress.clone(), job_id.clone());
        job.start();

        let budget = RunBudget::start(
            seconds_or(request.wall_clock_budget_sec, self.config.wall_clock_budget),
            seconds_or(request.per_call_timeout_sec, self.config.per_turn_timeout),
            self.config.safety_margin,
        );
        let dispatcher =
            ToolDispatcher::new(self.sandbox.clone()).with_validate_only(request.validate_only);

        tracing::info!(
            job_id = %job_id,
            spec = %request.spec.name,
            model = self.llm.model(),
            validate_only = request.validate_only,
            budget_ms = budget.remaining().as_millis() as u64,
            "Starting agent run"
        );
        job.running("agent_boot", PROGRESS_BOOT, "agent booting");

        let mut state = RunState {
            messages: seed_messages(&request.spec, request.dev_instructions.as_deref()),
            tool_log: Vec::new(),
            turns: 0,
            last_diff: None,
            final_text: None,
        };

        let exit = self.turn_loop(&mut state, &dispatcher, &budget, &job).await;
        let report = self
            .finalize(job_id, state, exit, &dispatcher, &budget, &job)
            .await;

        tracing::info!(
            job_id = %report.job_id,
            exit_reason = ?report.exit_reason,
            turns = report.turns,
            elapsed_ms = budget.elapsed().as_millis() as u64,
            "Agent run finished"
        );
        job.done(json!({
            "exit_reason": report.exit_reason,
            "turns": report.turns,
        }));
        report
    }

    async fn turn_loop(
        &self,
        state: &mut RunState,
        dispatcher: &ToolDispatcher,
        budget: &RunBudget,
        job: &JobProgress,
    ) -> ExitReason {
        let max_turns = self.config.max_turns.max(1);
        let schemas = dispatcher.schemas();

        for turn in 1..=max_turns {
            if self.cancel.is_cancelled() {
                state.tool_log.push(ToolLogEntry::Cancelled { turn });
                return ExitReason::Cancelled;
            }
            let Some(timeout) = budget.turn_timeout() else {
                tracing::info!(turn, "Wall-clock budget exhausted");
                return ExitReason::BudgetExhausted;
            };

            let fraction = PROGRESS_FIRST_TURN
                + (PROGRESS_DECLARED_DONE - PROGRESS_FIRST_TURN) * (turn - 1) as f64
                    / max_turns as f64;
            job.running_with(
                "agent_turn",
                fraction,
                json!({ "turn": turn, "timeout_ms": timeout.as_millis() as u64 }),
            );

            let mut request =
                CompletionRequest::new(state.messages.clone()).with_tools(schemas.clone());
            if let Some(temperature) = self.config.temperature {
                request = request.with_temperature(temperature);
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = tokio::time::timeout(timeout, self.llm.complete(request)) => Some(result),
            };
            state.turns = turn;

            let response = match outcome {
                None => {
                    state.tool_log.push(ToolLogEntry::Cancelled { turn });
                    return ExitReason::Cancelled;
                }
                Some(Err(_elapsed)) => {
                    let timeout_ms = timeout.as_millis() as u64;
                    tracing::warn!(turn, timeout_ms, "Text-generation call timed out");
                    state.tool_log.push(ToolLogEntry::Timeout { turn, timeout_ms });
                    job.info(
                        "agent_timeout",
                        format!("turn {turn} timed out after {timeout_ms} ms"),
                        json!({ "turn": turn }),
                    );
                    return ExitReason::TurnTimeout;
                }
                Some(Ok(Err(err))) => {
                    tracing::warn!(turn, error = %err, "Text-generation call failed");
                    state.tool_log.push(ToolLogEntry::ClientError {
                        turn,
                        message: err.to_string(),
                    });
                    job.info(
                        "agent_client_error",
                        err.to_string(),
                        json!({ "turn": turn }),
                    );
                    return ExitReason::ClientError;
                }
                Some(Ok(Ok(response))) => response,
            };

            if response.requested_tools() {
                state.messages.push(Message::assistant_calls(
                    response.content.clone(),
                    response.tool_calls.clone(),
                ));
                for call in response.tool_calls {
                    let output = self
                        .run_tool(state, dispatcher, Some(turn), &call, budget.work_window())
                        .await;
                    state
                        .messages
                        .push(Message::tool_result(call.id, output.to_message_content()));
                }
                continue;
            }

            let text = response.content.unwrap_or_default();
            if is_done_sentinel(&text) {
                let text = text.trim().to_string();
                tracing::info!(turn, "Model declared the work done");
                job.running("agent_declared_done", PROGRESS_DECLARED_DONE, text.clone());
                state.final_text = Some(text);
                return ExitReason::DeclaredDone;
            }

            tracing::debug!(turn, "Plain answer without sentinel, nudging");
            state.messages.push(Message::assistant(text));
            state.messages.push(Message::user(CONTINUE_PROMPT));
        }

        ExitReason::TurnCap
    }

    async fn run_tool(
        &self,
        state: &mut RunState,
        dispatcher: &ToolDispatcher,
        turn: Option<usize>,
        call: &ToolCall,
        limit: Duration,
    ) -> ToolOutput {
        let started = Instant::now();
        let dispatch = dispatcher.dispatch(&call.name, call.arguments.clone());
        let output = match tokio::time::timeout(limit, dispatch).await {
            Ok(output) => output,
            Err(_elapsed) => {
                let limit_ms = limit.as_millis() as u64;
                tracing::warn!(tool = %call.name, limit_ms, "Tool call ran out of budget");
                ToolOutput::error(format!(
                    "{} did not finish within the remaining budget ({limit_ms} ms)",
                    call.name
                ))
            }
        };

        if call.name == "fs_diff"
            && output.ok
            && let Some(text) = output.payload.get("text").and_then(Value::as_str)
        {
            state.last_diff = Some(text.to_string());
        }

        tracing::debug!(
            tool = %call.name,
            ok = output.ok,
            skipped = output.skipped,
            "Tool call finished"
        );
        state.tool_log.push(ToolLogEntry::Call {
            turn,
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: abbreviate(&call.arguments),
            ok: output.ok,
            skipped: output.skipped,
            error: output.error.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        output
    }

    /// Inventory, final diff, summary and last-run record. Runs for every
    /// exit reason; the filesystem calls share whatever budget is left and
    /// are skipped once the deadline has passed.
    async fn finalize(
        &self,
        job_id: String,
        mut state: RunState,
        exit: ExitReason,
        dispatcher: &ToolDispatcher,
        budget: &RunBudget,
        job: &JobProgress,
    ) -> AgentReport {
        job.running("agent_finalize", PROGRESS_FINALIZE, exit.describe());

        let mut inventory: Vec<String> = Vec::new();
        for (index, pattern) in self.config.inventory_patterns.iter().enumerate() {
            let remaining = budget.remaining();
            if remaining.is_zero() {
                tracing::debug!(pattern = %pattern, "Budget spent, skipping remaining inventory");
                break;
            }
            let call = ToolCall {
                id: format!("final-glob-{index}"),
                name: "fs_glob".to_string(),
                arguments: json!({ "pattern": pattern, "max_matches": 1000 }),
            };
            let output = self
                .run_tool(&mut state, dispatcher, None, &call, remaining)
                .await;
            if let Some(matches) = output.payload.get("matches").and_then(Value::as_array) {
                for path in matches.iter().filter_map(Value::as_str) {
                    if inventory.len() >= self.config.max_inventory_paths {
                        break;
                    }
                    if !inventory.iter().any(|p| p == path) {
                        inventory.push(path.to_string());
                    }
                }
            }
        }

        let remaining = budget.remaining();
        if state.last_diff.is_none() && !remaining.is_zero() {
            let arguments = if inventory.is_empty() {
                json!({})
            } else {
                json!({ "paths": inventory })
            };
            let call = ToolCall {
                id: "final-diff".to_string(),
                name: "fs_diff".to_string(),
                arguments,
            };
            self.run_tool(&mut state, dispatcher, None, &call, remaining)
                .await;
        }

        let mut summary = format!(
            "DONE: Agent run completed ({}; {} turn(s), {} tool call(s){}).",
            exit.describe(),
            state.turns,
            state.call_count(),
            if dispatcher.is_validate_only() {
                ", validate-only"
            } else {
                ""
            }
        );
        if let Some(text) = &state.final_text {
            summary.push('\n');
            summary.push_str(text);
        }

        let report = AgentReport {
            job_id,
            summary,
            diff_preview: tail_chars(
                state.last_diff.as_deref().unwrap_or_default(),
                self.config.diff_preview_chars,
            ),
            tool_log: state.tool_log,
            exit_reason: exit,
            turns: state.turns,
            validate_only: dispatcher.is_validate_only(),
        };

        if let Some(path) = &self.config.last_run_path {
            let record = LastRunRecord::from_report(&report, self.config.tool_log_keep);
            match record.save(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Saved last-run record"),
                Err(err) => tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed to save last-run record"
                ),
            }
        }

        job.ok(
            "agent_done",
            PROGRESS_AGENT_DONE,
            json!({ "exit_reason": exit, "tool_calls": report.tool_log.len() }),
        );
        report
    }
}

/// Seconds from a request, saturating at [`Duration::MAX`]; negative or
/// non-finite values take the fallback.
fn seconds_or(seconds: Option<f64>, fallback: Duration) -> Duration {
    match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => {
            Duration::try_from_secs_f64(s).unwrap_or(Duration::MAX)
        }
        _ => fallback,
    }
}

/// Last `max_chars` characters of `text`.
fn tail_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    text.chars().skip(total - max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("ééé", 2), "éé");
    }

    #[test]
    fn test_seconds_or() {
        let fallback = Duration::from_secs(60);
        assert_eq!(seconds_or(None, fallback), fallback);
        assert_eq!(seconds_or(Some(1.5), fallback), Duration::from_millis(1500));
        assert_eq!(seconds_or(Some(-1.0), fallback), fallback);
        assert_eq!(seconds_or(Some(f64::NAN), fallback), fallback);
        assert_eq!(seconds_or(Some(1e30), fallback), Duration::MAX);
    }
}
