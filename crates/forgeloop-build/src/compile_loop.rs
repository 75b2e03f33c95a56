//! Compile-verify-repair controller.
//!
//! EnsureScaffold, then bounded rounds of
//! analyze -> repair -> re-analyze -> test, stopping on the first round that
//! passes or when no safe repair is left.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use forgeloop_progress::{JobProgress, ProgressBus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::command::{CommandResult, CommandSpec};
use crate::error::BuildError;
use crate::repair::{ProjectLayout, Repairer, ensure_smoke_test, purge_sidecar_files};
use crate::runner::{CommandRunner, SystemRunner};
use crate::toolchain::Toolchain;

pub const MSG_PASSED: &str = "analyze & tests passed";
pub const MSG_NO_FIXES: &str = "analyze failed; no safe fixes available";
pub const MSG_EXHAUSTED: &str = "compile loop exhausted without success";
pub const MSG_CANCELLED: &str = "cancelled";

/// Minimum time granted to the platform scaffold step.
const MIN_SCAFFOLD_TIMEOUT: Duration = Duration::from_secs(600);

/// Tunables of one repair loop run.
#[derive(Debug, Clone)]
pub struct RepairLoopOptions {
    pub run_tests: bool,
    pub max_rounds: usize,
    pub fetch_dependencies_first: bool,
    pub fetch_timeout: Duration,
    pub analyze_timeout: Duration,
    /// Hard cap for the round-1 test run, which pays for cold caches.
    pub first_test_timeout: Duration,
    pub test_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` means `max(first_test_timeout, 600 s)`.
    pub scaffold_timeout: Option<Duration>,
}

impl Default for RepairLoopOptions {
    fn default() -> Self {
        Self {
            run_tests: true,
            max_rounds: 3,
            fetch_dependencies_first: true,
            fetch_timeout: Duration::from_secs(180),
            analyze_timeout: Duration::from_secs(180),
            first_test_timeout: Duration::from_secs(900),
            test_timeout: Duration::from_secs(360),
            idle_timeout: Duration::from_secs(60),
            scaffold_timeout: None,
        }
    }
}

impl RepairLoopOptions {
    pub fn with_run_tests(mut self, run_tests: bool) -> Self {
        self.run_tests = run_tests;
        self
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    pub fn with_fetch_dependencies_first(mut self, fetch: bool) -> Self {
        self.fetch_dependencies_first = fetch;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_analyze_timeout(mut self, timeout: Duration) -> Self {
        self.analyze_timeout = timeout;
        self
    }

    pub fn with_test_timeouts(mut self, first: Duration, later: Duration) -> Self {
        self.first_test_timeout = first;
        self.test_timeout = later;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_scaffold_timeout(mut self, timeout: Duration) -> Self {
        self.scaffold_timeout = Some(timeout);
        self
    }

    fn effective_scaffold_timeout(&self) -> Duration {
        self.scaffold_timeout
            .unwrap_or_else(|| self.first_test_timeout.max(MIN_SCAFFOLD_TIMEOUT))
    }
}

/// Inputs and outputs of one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileRound {
    pub round: usize,
    pub dependency_fetch_ran: bool,
    /// Last analyze run of the round.
    pub analyze: CommandResult,
    pub tests: Option<CommandResult>,
    pub fixes_applied: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Final report of a repair loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileReport {
    pub ok: bool,
    pub message: String,
    pub rounds: Vec<CompileRound>,
}

/// Early stop carrying the report message.
struct Abort(String);

impl Abort {
    fn from_build(error: BuildError, toolchain: &Toolchain) -> Self {
        match error {
            BuildError::NotFound { program } if program == toolchain.binary => Abort(format!(
                "{program} binary not found (set FLUTTER_BIN or adjust PATH)"
            )),
            other => Abort(other.to_string()),
        }
    }
}

/// Runs the compile-verify-repair loop over one project.
pub struct RepairLoop {
    runner: Arc<dyn CommandRunner>,
    toolchain: Toolchain,
    repairer: Repairer,
    options: RepairLoopOptions,
    progress: JobProgress,
    cancel: CancellationToken,
}

impl RepairLoop {
    pub fn new(runner: Arc<dyn CommandRunner>, toolchain: Toolchain) -> Self {
        Self {
            runner,
            toolchain,
            repairer: Repairer::new(),
            options: RepairLoopOptions::default(),
            progress: JobProgress::new(ProgressBus::new(), Uuid::new_v4().to_string()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: RepairLoopOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_repairer(mut self, repairer: Repairer) -> Self {
        self.repairer = repairer;
        self
    }

    pub fn with_progress(mut self, progress: JobProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Token checked at the head of every round.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn job_id(&self) -> &str {
        self.progress.job_id()
    }

    pub async fn run(&self, project_dir: &Path) -> CompileReport {
        let mut rounds = Vec::new();
        self.progress.start();

        let report = match self.run_rounds(project_dir, &mut rounds).await {
            Ok((ok, message)) => CompileReport {
                ok,
                message: message.to_string(),
                rounds,
            },
            Err(Abort(message)) => CompileReport {
                ok: false,
                message,
                rounds,
            },
        };

        tracing::info!(
            job_id = self.progress.job_id(),
            ok = report.ok,
            rounds = report.rounds.len(),
            message = %report.message,
            "Repair loop finished"
        );
        if report.ok {
            self.progress.done(json!({ "rounds": report.rounds.len() }));
        } else {
            self.progress.fail("repair_done", report.message.clone());
        }
        report
    }

    async fn run_rounds(
        &self,
        project_dir: &Path,
        rounds: &mut Vec<CompileRound>,
    ) -> Result<(bool, &'static str), Abort> {
        let layout = ProjectLayout::new(project_dir).map_err(|err| {
            Abort(format!(
                "project directory {} unavailable: {err}",
                project_dir.display()
            ))
        })?;
        let root = layout.root();
        let opts = &self.options;
        tracing::info!(
            project = %root.display(),
            binary = %self.toolchain.binary,
            max_rounds = opts.max_rounds,
            run_tests = opts.run_tests,
            "Starting repair loop"
        );

        self.ensure_scaffold(root).await?;

        if opts.fetch_dependencies_first {
            self.progress.running("repair_fetch", 0.05, "fetching dependencies");
            // A failing fetch is not fatal; the analyzer reports what is missing.
            self.exec(&self.toolchain.fetch_dependencies(root), opts.fetch_timeout)
                .await?;
        }

        let max_rounds = opts.max_rounds.max(1);
        let mut full_suite_allowed = false;

        for round in 1..=max_rounds {
            if self.cancel.is_cancelled() {
                tracing::info!(round, "Repair loop cancelled");
                return Err(Abort(MSG_CANCELLED.to_string()));
            }

            let fraction = 0.1 + 0.85 * (round - 1) as f64 / max_rounds as f64;
            self.progress.running_with(
                "repair_round",
                fraction,
                json!({ "round": round, "max_rounds": max_rounds }),
            );
            purge_sidecar_files(&layout);

            let analyze_spec = self.toolchain.analyze(root);
            let mut analyze = self.exec(&analyze_spec, opts.analyze_timeout).await?;
            let mut fixes_applied = Vec::new();
            let mut notes = Vec::new();
            let mut dependency_fetch_ran = false;

            if !analyze.is_success() {
                let diagnostics = analyze.combined_output();
                let pass = self.repairer.apply(&layout, &diagnostics).map_err(|err| {
                    Abort(format!("autofix failed due to filesystem error: {err}"))
                })?;
                fixes_applied = pass.applied;
                notes = pass.notes;
                self.progress.info(
                    "repair_fix",
                    format!("{} fix(es) applied", fixes_applied.len()),
                    json!({ "round": round, "fixes": fixes_applied }),
                );

                if diagnostics.contains(&self.toolchain.lint_fix_trigger) {
                    self.run_lint_fix(root).await;
                }

                if !fixes_applied.is_empty() {
                    self.exec(&self.toolchain.fetch_dependencies(root), opts.fetch_timeout)
                        .await?;
                    dependency_fetch_ran = true;
                    analyze = self.exec(&analyze_spec, opts.analyze_timeout).await?;
                }
            }

            if !analyze.is_success() && fixes_applied.is_empty() {
                rounds.push(CompileRound {
                    round,
                    dependency_fetch_ran,
                    analyze,
                    tests: None,
                    fixes_applied,
                    notes,
                });
                return Ok((false, MSG_NO_FIXES));
            }

            // Tests also run after a repair pass whose re-analyze still fails,
            // so the smoke gate can open before the analyzer is clean.
            let analyze_ok = analyze.is_success();
            let tests = if opts.run_tests {
                let (result, smoke) = self
                    .run_tests(&layout, round, full_suite_allowed)
                    .await?;
                if smoke && result.is_success() {
                    full_suite_allowed = true;
                }
                Some(result)
            } else {
                None
            };
            let tests_ok = tests.as_ref().is_none_or(CommandResult::is_success);

            rounds.push(CompileRound {
                round,
                dependency_fetch_ran,
                analyze,
                tests,
                fixes_applied,
                notes,
            });

            if analyze_ok && tests_ok {
                self.progress
                    .ok("repair_round", fraction, json!({ "round": round }));
                return Ok((true, MSG_PASSED));
            }
            tracing::info!(round, analyze_ok, tests_ok, "Round did not pass");
        }

        Ok((false, MSG_EXHAUSTED))
    }

    async fn ensure_scaffold(&self, root: &Path) -> Result<(), Abort> {
        let missing = self.toolchain.missing_platforms(root);
        if missing.is_empty() {
            return Ok(());
        }
        self.progress.running(
            "repair_scaffold",
            0.02,
            format!("creating platforms {}", missing.join(",")),
        );
        let spec = self.toolchain.scaffold(root, &missing);
        let result = self
            .exec(&spec, self.options.effective_scaffold_timeout())
            .await?;
        if !result.is_success() {
            tracing::warn!(
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "Platform scaffold failed"
            );
        }
        Ok(())
    }

    /// Returns the test result and whether it was the smoke subset.
    async fn run_tests(
        &self,
        layout: &ProjectLayout,
        round: usize,
        full_suite_allowed: bool,
    ) -> Result<(CommandResult, bool), Abort> {
        let root = layout.root();
        let first_round = round == 1;
        let opts = &self.options;

        let (spec, hard_timeout, smoke) = if first_round || !full_suite_allowed {
            ensure_smoke_test(layout).map_err(|err| {
                Abort(format!("could not write the smoke test: {err}"))
            })?;
            let timeout = if first_round {
                opts.first_test_timeout
            } else {
                opts.test_timeout
            };
            (self.toolchain.smoke_test(root), timeout, true)
        } else {
            (self.toolchain.full_test(root), opts.test_timeout, false)
        };

        self.progress.running_with(
            "repair_test",
            self.progress.current(),
            json!({ "round": round, "smoke": smoke }),
        );
        let result = self
            .runner
            .run_watched(&spec, hard_timeout, opts.idle_timeout)
            .await
            .map_err(|err| Abort::from_build(err, &self.toolchain))?;
        Ok((result, smoke))
    }

    async fn run_lint_fix(&self, root: &Path) {
        let spec = self.toolchain.lint_fix(root);
        match self.runner.run(&spec, self.options.analyze_timeout).await {
            Ok(result) if result.is_success() => tracing::info!("Applied automatic lint fixes"),
            Ok(result) => tracing::warn!(exit_code = result.exit_code, "Lint fix failed"),
            Err(err) => tracing::warn!(error = %err, "Lint fix could not run"),
        }
    }

    async fn exec(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandResult, Abort> {
        self.runner
            .run(spec, timeout)
            .await
            .map_err(|err| Abort::from_build(err, &self.toolchain))
    }
}

/// Run the repair loop over `project_dir` with real processes and the
/// toolchain described by the environment.
pub async fn run_repair_loop(project_dir: &Path, options: RepairLoopOptions) -> CompileReport {
    RepairLoop::new(Arc::new(SystemRunner::new()), Toolchain::from_env())
        .with_options(options)
        .run(project_dir)
        .await
}
