use anyhow::{Context, Result, bail};
use forgeloop_ai::LastRunRecord;

use crate::cli::OutputFormat;
use crate::config::ForgeConfig;
use crate::output;

pub fn run(config: &ForgeConfig, format: OutputFormat) -> Result<bool> {
    let path = config
        .agent
        .last_run_path()
        .context("no data directory available; set [agent].state_dir")?;
    if !path.exists() {
        bail!("no agent run recorded yet ({})", path.display());
    }
    let record = LastRunRecord::load(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if format.is_json() {
        output::print_json(&record)?;
    } else {
        output::print_last_run(&record);
    }
    Ok(true)
}
