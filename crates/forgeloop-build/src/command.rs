//! Command descriptions and captured results.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reported for processes killed by a timeout or the watchdog.
pub const KILLED_EXIT_CODE: i32 = 124;

/// One external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Shell-quoted command line, for logs and reports.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The process exited on its own.
    Exited,
    /// Killed by the watchdog after producing no output for too long.
    IdleTimeout,
    /// Killed after exceeding the hard cap.
    HardTimeout,
}

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub outcome: CommandOutcome,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.outcome == CommandOutcome::Exited && self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.outcome != CommandOutcome::Exited
    }

    /// Combined output used for diagnostic scanning.
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

pub(crate) fn format_secs(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{secs:.1}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_when_needed() {
        let spec = CommandSpec::new("flutter", "/tmp")
            .arg("test")
            .arg("test/smoke_test.dart")
            .arg("--platforms=macos,ios")
            .arg("it's here");
        assert_eq!(
            spec.display(),
            r"flutter test test/smoke_test.dart --platforms=macos,ios 'it'\''s here'"
        );
    }

    #[test]
    fn test_success_requires_natural_exit() {
        let mut result = CommandResult {
            command: "x".to_string(),
            exit_code: 0,
            duration_ms: 1,
            stdout: String::new(),
            stderr: String::new(),
            outcome: CommandOutcome::Exited,
        };
        assert!(result.is_success());
        result.outcome = CommandOutcome::IdleTimeout;
        assert!(!result.is_success());
        assert!(result.timed_out());
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(Duration::from_secs(60)), "60s");
        assert_eq!(format_secs(Duration::from_millis(500)), "0.5s");
    }
}
