//! Configuration file support
//!
//! Loads `~/.config/forgeloop/config.toml` (or `--config`), then applies
//! environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use forgeloop_ai::agent::last_run;
use forgeloop_ai::{AgentRunConfig, OpenAIClient, RetryPolicy};
use forgeloop_build::toolchain::parse_platforms;
use forgeloop_build::{RepairLoopOptions, Toolchain};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub repair: RepairConfig,
}

/// Text-generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            max_attempts: 3,
            base_delay_ms: 400,
            max_delay_ms: 8000,
        }
    }
}

impl LlmConfig {
    pub fn client(&self) -> OpenAIClient {
        let policy = RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms));
        OpenAIClient::new(self.api_key.clone().unwrap_or_default())
            .with_model(&self.model)
            .with_base_url(&self.base_url)
            .with_retry_policy(policy)
    }
}

/// Agent loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Project root the agent is confined to
    pub workspace: Option<PathBuf>,
    pub wall_clock_budget_secs: f64,
    pub per_turn_timeout_secs: f64,
    pub max_turns: usize,
    pub safety_margin_ms: u64,
    /// Glob patterns inventoried at finalization; empty keeps the built-in list
    pub inventory_patterns: Vec<String>,
    /// Where `last_run.json` is kept (defaults to the user data dir)
    pub state_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let defaults = AgentRunConfig::default();
        Self {
            workspace: None,
            wall_clock_budget_secs: defaults.wall_clock_budget.as_secs_f64(),
            per_turn_timeout_secs: defaults.per_turn_timeout.as_secs_f64(),
            max_turns: defaults.max_turns,
            safety_margin_ms: defaults.safety_margin.as_millis() as u64,
            inventory_patterns: Vec::new(),
            state_dir: None,
        }
    }
}

fn seconds(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(fallback)
}

impl AgentConfig {
    pub fn run_config(&self) -> AgentRunConfig {
        let defaults = AgentRunConfig::default();
        let mut config = AgentRunConfig::default()
            .with_wall_clock_budget(seconds(
                self.wall_clock_budget_secs,
                defaults.wall_clock_budget,
            ))
            .with_per_turn_timeout(seconds(self.per_turn_timeout_secs, defaults.per_turn_timeout))
            .with_safety_margin(Duration::from_millis(self.safety_margin_ms))
            .with_max_turns(self.max_turns)
            .with_last_run_path(self.last_run_path());
        if !self.inventory_patterns.is_empty() {
            config = config.with_inventory_patterns(self.inventory_patterns.clone());
        }
        config
    }

    pub fn last_run_path(&self) -> Option<PathBuf> {
        match &self.state_dir {
            Some(dir) => Some(last_run::path_in(dir)),
            None => last_run::default_path(),
        }
    }
}

/// Repair loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Toolchain binary (defaults to `flutter`)
    pub binary: Option<String>,
    pub platforms: Option<Vec<String>>,
    pub run_tests: bool,
    pub max_rounds: usize,
    pub fetch_dependencies_first: bool,
    pub fetch_timeout_secs: u64,
    pub analyze_timeout_secs: u64,
    pub first_test_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub scaffold_timeout_secs: Option<u64>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        let defaults = RepairLoopOptions::default();
        Self {
            binary: None,
            platforms: None,
            run_tests: defaults.run_tests,
            max_rounds: defaults.max_rounds,
            fetch_dependencies_first: defaults.fetch_dependencies_first,
            fetch_timeout_secs: defaults.fetch_timeout.as_secs(),
            analyze_timeout_secs: defaults.analyze_timeout.as_secs(),
            first_test_timeout_secs: defaults.first_test_timeout.as_secs(),
            test_timeout_secs: defaults.test_timeout.as_secs(),
            idle_timeout_secs: defaults.idle_timeout.as_secs(),
            scaffold_timeout_secs: None,
        }
    }
}

impl RepairConfig {
    pub fn toolchain(&self) -> Toolchain {
        let mut toolchain = Toolchain::default();
        if let Some(binary) = &self.binary {
            toolchain = toolchain.with_binary(binary);
        }
        if let Some(platforms) = &self.platforms {
            toolchain = toolchain.with_platforms(platforms.clone());
        }
        toolchain
    }

    pub fn options(&self) -> RepairLoopOptions {
        let options = RepairLoopOptions::default()
            .with_run_tests(self.run_tests)
            .with_max_rounds(self.max_rounds)
            .with_fetch_dependencies_first(self.fetch_dependencies_first)
            .with_fetch_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_analyze_timeout(Duration::from_secs(self.analyze_timeout_secs))
            .with_test_timeouts(
                Duration::from_secs(self.first_test_timeout_secs),
                Duration::from_secs(self.test_timeout_secs),
            )
            .with_idle_timeout(Duration::from_secs(self.idle_timeout_secs));
        match self.scaffold_timeout_secs {
            Some(secs) => options.with_scaffold_timeout(Duration::from_secs(secs)),
            None => options,
        }
    }
}

impl ForgeConfig {
    /// Load from `path`, or the default location when none is given.
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_path(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("forgeloop").join("config.toml"))
    }

    /// Apply environment overrides; `lookup` returns the variable's value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("FORGELOOP_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("FORGELOOP_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(workspace) = lookup("FORGELOOP_WORKSPACE") {
            self.agent.workspace = Some(PathBuf::from(workspace));
        }
        if let Some(binary) = lookup("FLUTTER_BIN") {
            self.repair.binary = Some(binary);
        }
        if let Some(platforms) = lookup("FORGELOOP_PLATFORMS") {
            self.repair.platforms = Some(parse_platforms(&platforms));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_library_defaults() {
        let config = ForgeConfig::default();
        assert_eq!(config.llm.model, "gpt-5");
        assert_eq!(config.agent.max_turns, 15);
        assert_eq!(config.agent.safety_margin_ms, 1500);

        let run = config.agent.run_config();
        assert_eq!(run.wall_clock_budget, Duration::from_secs(60));
        assert_eq!(run.per_turn_timeout, Duration::from_secs(20));
        assert_eq!(run.inventory_patterns.len(), 5);

        let options = config.repair.options();
        assert_eq!(options.max_rounds, 3);
        assert_eq!(options.idle_timeout, Duration::from_secs(60));
        assert!(options.scaffold_timeout.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[llm]
model = "local-coder"

[agent]
wall_clock_budget_secs = 12.5
state_dir = "/tmp/forgeloop-state"

[repair]
platforms = ["ios"]
max_rounds = 5
"#,
        )
        .unwrap();

        let config = ForgeConfig::load_from_path(&path).unwrap();
        assert_eq!(config.llm.model, "local-coder");
        assert_eq!(config.llm.max_attempts, 3);
        assert_eq!(
            config.agent.run_config().wall_clock_budget,
            Duration::from_millis(12_500)
        );
        assert_eq!(
            config.agent.last_run_path(),
            Some(PathBuf::from("/tmp/forgeloop-state/last_run.json"))
        );
        assert_eq!(config.repair.toolchain().platforms, vec!["ios".to_string()]);
        assert_eq!(config.repair.options().max_rounds, 5);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nmax_turns = \"many\"\n").unwrap();
        let err = ForgeConfig::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));

        assert!(ForgeConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("FORGELOOP_MODEL", "gpt-5-mini"),
            ("FORGELOOP_WORKSPACE", "/work/app"),
            ("FLUTTER_BIN", "/opt/flutter/bin/flutter"),
            ("FORGELOOP_PLATFORMS", "macos, IOS"),
            ("FORGELOOP_BASE_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = ForgeConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.model, "gpt-5-mini");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.agent.workspace, Some(PathBuf::from("/work/app")));
        let toolchain = config.repair.toolchain();
        assert_eq!(toolchain.binary, "/opt/flutter/bin/flutter");
        assert_eq!(toolchain.platforms, vec!["macos".to_string(), "ios".to_string()]);
    }

    #[test]
    fn test_zero_budget_falls_back_to_default() {
        let agent = AgentConfig {
            wall_clock_budget_secs: -1.0,
            per_turn_timeout_secs: 0.0,
            ..AgentConfig::default()
        };
        let run = agent.run_config();
        assert_eq!(run.wall_clock_budget, Duration::from_secs(60));
        assert_eq!(run.per_turn_timeout, Duration::from_secs(20));
    }
}
