use std::path::PathBuf;
use std::time::Duration;

use super::last_run;

/// Default inventory globs checked during finalization.
pub const DEFAULT_INVENTORY_PATTERNS: [&str; 5] = [
    "lib/**/*",
    "test/**/*",
    "design/**/*",
    "infra/**/*",
    "backend/**/*",
];

/// Agent run configuration
#[derive(Debug, Clone)]
pub struct AgentRunConfig {
    /// Total wall-clock time for one run, finalization included.
    pub wall_clock_budget: Duration,
    /// Upper bound for a single text-generation call.
    pub per_turn_timeout: Duration,
    /// Time held back from the turns for finalization.
    pub safety_margin: Duration,
    pub max_turns: usize,
    pub temperature: Option<f32>,
    pub inventory_patterns: Vec<String>,
    pub max_inventory_paths: usize,
    pub diff_preview_chars: usize,
    pub tool_log_keep: usize,
    /// Where the last-run record is written; `None` disables it.
    pub last_run_path: Option<PathBuf>,
}

impl Default for AgentRunConfig {
    fn default() -> Self {
        Self {
            wall_clock_budget: Duration::from_secs(60),
            per_turn_timeout: Duration::from_secs(20),
            safety_margin: Duration::from_millis(1500),
            max_turns: 15,
            temperature: None,
            inventory_patterns: DEFAULT_INVENTORY_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            max_inventory_paths: 2000,
            diff_preview_chars: 4000,
            tool_log_keep: 200,
            last_run_path: last_run::default_path(),
        }
    }
}

impl AgentRunConfig {
    pub fn with_wall_clock_budget(mut self, budget: Duration) -> Self {
        self.wall_clock_budget = budget;
        self
    }

    pub fn with_per_turn_timeout(mut self, timeout: Duration) -> Self {
        self.per_turn_timeout = timeout;
        self
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn with_max_turns(mut self, turns: usize) -> Self {
        self.max_turns = turns.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_inventory_patterns(mut self, patterns: Vec<String>) -> Self {
        self.inventory_patterns = patterns;
        self
    }

    pub fn with_last_run_path(mut self, path: Option<PathBuf>) -> Self {
        self.last_run_path = path;
        self
    }
}
