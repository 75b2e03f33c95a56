//! The external toolchain driven by the repair loop.

use std::path::Path;

use crate::command::CommandSpec;

pub const DEFAULT_BINARY: &str = "flutter";
pub const DEFAULT_PLATFORM: &str = "macos";
const BINARY_ENV: &str = "FLUTTER_BIN";
const PLATFORMS_ENV: &str = "FORGELOOP_PLATFORMS";

/// Commands of a Flutter/Dart style toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub binary: String,
    /// Platforms whose project folders must exist before analyzing.
    pub platforms: Vec<String>,
    /// Binary used for automatic lint fixes.
    pub lint_fix_binary: String,
    /// Analyzer output fragment that triggers the lint fix.
    pub lint_fix_trigger: String,
    pub smoke_test: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            platforms: vec![DEFAULT_PLATFORM.to_string()],
            lint_fix_binary: "dart".to_string(),
            lint_fix_trigger: "annotate_overrides".to_string(),
            smoke_test: "test/smoke_test.dart".to_string(),
        }
    }
}

impl Toolchain {
    /// Defaults overridden by `FLUTTER_BIN` and `FORGELOOP_PLATFORMS`.
    pub fn from_env() -> Self {
        let mut toolchain = Self::default();
        if let Ok(binary) = std::env::var(BINARY_ENV)
            && !binary.trim().is_empty()
        {
            toolchain.binary = binary.trim().to_string();
        }
        if let Ok(platforms) = std::env::var(PLATFORMS_ENV) {
            toolchain.platforms = parse_platforms(&platforms);
        }
        toolchain
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<String>) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn analyze(&self, project: &Path) -> CommandSpec {
        CommandSpec::new(&self.binary, project).args(["analyze", "--no-pub"])
    }

    pub fn fetch_dependencies(&self, project: &Path) -> CommandSpec {
        CommandSpec::new(&self.binary, project).args(["pub", "get"])
    }

    pub fn smoke_test(&self, project: &Path) -> CommandSpec {
        CommandSpec::new(&self.binary, project).args([
            "test",
            self.smoke_test.as_str(),
            "--concurrency=1",
            "--machine",
        ])
    }

    pub fn full_test(&self, project: &Path) -> CommandSpec {
        CommandSpec::new(&self.binary, project).args(["test", "--concurrency=1", "--machine"])
    }

    pub fn scaffold(&self, project: &Path, platforms: &[String]) -> CommandSpec {
        CommandSpec::new(&self.binary, project)
            .args(["create", "."])
            .arg(format!("--platforms={}", platforms.join(",")))
    }

    pub fn lint_fix(&self, project: &Path) -> CommandSpec {
        CommandSpec::new(&self.lint_fix_binary, project).args(["fix", "--apply"])
    }

    /// Declared platforms without a project folder.
    pub fn missing_platforms(&self, project: &Path) -> Vec<String> {
        self.platforms
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty() && !project.join(p).is_dir())
            .collect()
    }
}

/// Comma separated platform list, e.g. `"macos, ios"`.
pub fn parse_platforms(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_platforms() {
        assert_eq!(parse_platforms(" macOS, ios ,,web"), vec!["macos", "ios", "web"]);
        assert!(parse_platforms("").is_empty());
    }

    #[test]
    fn test_missing_platforms() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("ios")).unwrap();
        let toolchain = Toolchain::default().with_platforms(vec![
            "macos".to_string(),
            "ios".to_string(),
            "Web".to_string(),
        ]);
        assert_eq!(toolchain.missing_platforms(dir.path()), vec!["macos", "web"]);
    }

    #[test]
    fn test_command_lines() {
        let toolchain = Toolchain::default().with_binary("/opt/flutter/bin/flutter");
        let dir = Path::new("/work/app");
        assert_eq!(
            toolchain.analyze(dir).display(),
            "/opt/flutter/bin/flutter analyze --no-pub"
        );
        assert_eq!(
            toolchain.smoke_test(dir).display(),
            "/opt/flutter/bin/flutter test test/smoke_test.dart --concurrency=1 --machine"
        );
        assert_eq!(
            toolchain
                .scaffold(dir, &["macos".to_string(), "ios".to_string()])
                .display(),
            "/opt/flutter/bin/flutter create . --platforms=macos,ios"
        );
        assert_eq!(toolchain.lint_fix(dir).display(), "dart fix --apply");
    }
}
