//! Agent loop: Booting, turns, finalization, report.

mod budget;
mod config;
pub mod last_run;
mod prompt;
mod runner;
mod state;

pub use budget::RunBudget;
pub use config::{AgentRunConfig, DEFAULT_INVENTORY_PATTERNS};
pub use last_run::LastRunRecord;
pub use prompt::DONE_SENTINEL;
pub use runner::AgentRunner;
pub use state::{AgentReport, AgentRequest, ExitReason, Specification, ToolLogEntry};
