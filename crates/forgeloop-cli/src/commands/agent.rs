use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use forgeloop_ai::{AgentRequest, AgentRunner, ExitReason, Sandbox, Specification};
use forgeloop_build::{RepairLoop, SystemRunner};
use forgeloop_progress::JobProgress;
use serde_json::json;

use super::{ProgressForwarder, cancel_on_ctrl_c};
use crate::cli::{AgentArgs, OutputFormat};
use crate::config::ForgeConfig;
use crate::output;

fn read_spec(path: &Path) -> Result<Specification> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read specification {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid specification file {}", path.display()))
}

pub async fn run(config: &ForgeConfig, args: AgentArgs, format: OutputFormat) -> Result<bool> {
    let spec = read_spec(&args.spec)?;
    let workspace = args
        .workspace
        .or_else(|| config.agent.workspace.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let client = config.llm.client();
    if !client.is_enabled() {
        bail!("no API key configured; set OPENAI_API_KEY or [llm].api_key");
    }
    let sandbox = Sandbox::new(&workspace)
        .with_context(|| format!("workspace {} is not usable", workspace.display()))?;

    let mut request = AgentRequest::new(spec).with_validate_only(args.validate_only);
    if let Some(instructions) = args.dev_instructions {
        request = request.with_dev_instructions(instructions);
    }
    if let Some(budget) = args.budget {
        request = request.with_wall_clock_budget_sec(budget);
    }
    if let Some(timeout) = args.per_call_timeout {
        request = request.with_per_call_timeout_sec(timeout);
    }

    let progress = ProgressForwarder::start();
    let cancel = cancel_on_ctrl_c();

    let report = AgentRunner::new(Arc::new(client), Arc::new(sandbox), progress.bus().clone())
        .with_config(config.agent.run_config())
        .with_cancellation(cancel.clone())
        .run_agent(request)
        .await;

    let repair = if args.verify && !cancel.is_cancelled() {
        let job = JobProgress::new(progress.bus().clone(), format!("{}-verify", report.job_id));
        let compile = RepairLoop::new(Arc::new(SystemRunner::new()), config.repair.toolchain())
            .with_options(config.repair.options())
            .with_progress(job)
            .with_cancellation(cancel)
            .run(&workspace)
            .await;
        Some(compile)
    } else {
        None
    };
    progress.finish().await;

    if format.is_json() {
        output::print_json(&json!({ "agent": report, "repair": repair }))?;
    } else {
        output::print_agent_report(&report);
        if let Some(compile) = &repair {
            println!();
            output::print_compile_report(compile);
        }
    }

    let agent_ok = !matches!(
        report.exit_reason,
        ExitReason::ClientError | ExitReason::Cancelled
    );
    Ok(agent_ok && repair.as_ref().is_none_or(|r| r.ok))
}
