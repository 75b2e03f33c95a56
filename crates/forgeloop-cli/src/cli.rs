use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for command results
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

#[derive(Parser)]
#[command(name = "forgeloop")]
#[command(version, about = "Forgeloop - agentic code generation with a compile-verify-repair loop")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ~/.config/forgeloop/config.toml)
    #[arg(long, global = true, env = "FORGELOOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the coding agent over the workspace
    Agent(AgentArgs),

    /// Run the compile-verify-repair loop over a project
    Repair(RepairArgs),

    /// Show the record of the most recent agent run
    LastRun,
}

#[derive(Args)]
pub struct AgentArgs {
    /// Specification JSON file
    pub spec: PathBuf,

    /// Project directory the agent may touch (overrides config)
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Extra instructions appended to the conversation
    #[arg(long)]
    pub dev_instructions: Option<String>,

    /// Allow read-only tools only
    #[arg(long)]
    pub validate_only: bool,

    /// Wall-clock budget in seconds
    #[arg(long)]
    pub budget: Option<f64>,

    /// Per-call timeout in seconds
    #[arg(long)]
    pub per_call_timeout: Option<f64>,

    /// Run the repair loop over the workspace afterwards
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args)]
pub struct RepairArgs {
    /// Project directory (defaults to the configured workspace, then ".")
    pub project: Option<PathBuf>,

    /// Stop after the analyzer; never run tests
    #[arg(long)]
    pub no_tests: bool,

    /// Maximum number of repair rounds
    #[arg(long)]
    pub max_rounds: Option<usize>,

    /// Skip the initial dependency fetch
    #[arg(long)]
    pub skip_fetch: bool,

    /// Hard timeout for test runs after the first round, in seconds
    #[arg(long)]
    pub test_timeout: Option<u64>,

    /// Kill a test run that prints nothing for this many seconds
    #[arg(long)]
    pub idle_timeout: Option<u64>,
}
