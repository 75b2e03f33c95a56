use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use forgeloop_build::{RepairLoop, SystemRunner};
use forgeloop_progress::JobProgress;

use super::{ProgressForwarder, cancel_on_ctrl_c};
use crate::cli::{OutputFormat, RepairArgs};
use crate::config::ForgeConfig;
use crate::output;

pub async fn run(config: &ForgeConfig, args: RepairArgs, format: OutputFormat) -> Result<bool> {
    let project = args
        .project
        .or_else(|| config.agent.workspace.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    if !project.is_dir() {
        bail!("project directory {} does not exist", project.display());
    }

    let mut settings = config.repair.clone();
    if args.no_tests {
        settings.run_tests = false;
    }
    if args.skip_fetch {
        settings.fetch_dependencies_first = false;
    }
    if let Some(rounds) = args.max_rounds {
        settings.max_rounds = rounds;
    }
    if let Some(secs) = args.test_timeout {
        settings.test_timeout_secs = secs;
    }
    if let Some(secs) = args.idle_timeout {
        settings.idle_timeout_secs = secs;
    }

    let progress = ProgressForwarder::start();
    let repair_loop = RepairLoop::new(Arc::new(SystemRunner::new()), settings.toolchain())
        .with_options(settings.options())
        .with_cancellation(cancel_on_ctrl_c());
    let job = JobProgress::new(progress.bus().clone(), repair_loop.job_id().to_string());
    let report = repair_loop.with_progress(job).run(&project).await;
    progress.finish().await;

    if format.is_json() {
        output::print_json(&report)?;
    } else {
        output::print_compile_report(&report);
    }
    Ok(report.ok)
}
