//! Heuristic repair of analyzer diagnostics.
//!
//! Raw diagnostic text is scanned by an ordered list of [`RepairRule`]s.
//! Each rule proposes [`RepairAction`]s; the [`Repairer`] materializes them
//! inside the project root only. Placeholders never replace real content, so
//! running the same diagnostics twice changes nothing the second time.

mod paths;
mod rules;
mod stubs;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

pub use paths::{AUTOFIX_DIR, clamp_within, class_name_for, fallback_for};
pub use rules::{MissingTargetRule, SmokeTestRule, UndefinedClassRule, UndefinedMethodRule};
pub use stubs::{SMOKE_TEST, class_stub, widget_stub};

use paths::{display_relative, writes_inside};

/// Files smaller than this are treated as empty placeholders and may be
/// refilled.
pub const TRIVIAL_FILE_BYTES: u64 = 40;

const ROUTER_ORIGIN: &str = "lib/core/routing/app_router.dart";
const SMOKE_TEST_PATH: &str = "test/smoke_test.dart";

/// Canonical view of the project a repair pass works on.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: root.as_ref().canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory relative imports are resolved from: the router's folder
    /// when the app has one, `lib/` otherwise.
    pub fn import_anchor(&self) -> PathBuf {
        let router = Path::new(ROUTER_ORIGIN);
        match router.parent() {
            Some(dir) if self.root.join(router).is_file() => dir.to_path_buf(),
            _ => PathBuf::from("lib"),
        }
    }

    pub fn smoke_test(&self) -> Option<PathBuf> {
        clamp_within(&self.root, Path::new(SMOKE_TEST_PATH), SMOKE_TEST_PATH)
    }
}

/// A single proposed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    /// Write `content` unless a non-trivial file is already there.
    Placeholder { path: PathBuf, content: String },
    /// Write `content` only when nothing exists at `path`.
    CreateIfAbsent { path: PathBuf, content: String },
    /// Observation recorded in the report; nothing is written.
    Note(String),
}

/// Pattern rule turning diagnostics into repair actions.
pub trait RepairRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn plan(&self, diagnostics: &str, layout: &ProjectLayout) -> Vec<RepairAction>;
}

/// What happened to one placeholder file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Created,
    Filled,
    Kept,
}

impl FileOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, FileOutcome::Kept)
    }

    fn verb(self) -> &'static str {
        match self {
            FileOutcome::Created => "created",
            FileOutcome::Filled => "filled",
            FileOutcome::Kept => "kept",
        }
    }
}

/// Create `path` with `content`, or refill it when it is trivially small.
/// Existing real content, identical content and links are kept.
pub fn make_file(path: &Path, content: &str) -> io::Result<FileOutcome> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => {
            if meta.len() >= TRIVIAL_FILE_BYTES {
                return Ok(FileOutcome::Kept);
            }
            if fs::read(path)? == content.as_bytes() {
                return Ok(FileOutcome::Kept);
            }
            fs::write(path, content)?;
            Ok(FileOutcome::Filled)
        }
        Ok(_) => Ok(FileOutcome::Kept),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)?;
            Ok(FileOutcome::Created)
        }
        Err(err) => Err(err),
    }
}

fn create_if_absent(path: &Path, content: &str) -> io::Result<FileOutcome> {
    if fs::symlink_metadata(path).is_ok() {
        return Ok(FileOutcome::Kept);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(FileOutcome::Created)
}

/// Result of one repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPass {
    /// Files created or filled, e.g. `created lib/features/home_view.dart`.
    pub applied: Vec<String>,
    /// Kept files and observations that changed nothing.
    pub notes: Vec<String>,
}

impl RepairPass {
    pub fn has_changes(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Applies an ordered rule list to diagnostic text.
pub struct Repairer {
    rules: Vec<Box<dyn RepairRule>>,
}

impl Default for Repairer {
    fn default() -> Self {
        Self::new()
    }
}

impl Repairer {
    /// Repairer with the built-in Dart rules.
    pub fn new() -> Self {
        Self::empty()
            .with_rule(MissingTargetRule)
            .with_rule(UndefinedClassRule)
            .with_rule(UndefinedMethodRule)
            .with_rule(SmokeTestRule)
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule; rules run in insertion order.
    pub fn with_rule(mut self, rule: impl RepairRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn apply(&self, layout: &ProjectLayout, diagnostics: &str) -> io::Result<RepairPass> {
        let mut pass = RepairPass::default();
        for rule in &self.rules {
            for action in rule.plan(diagnostics, layout) {
                let (path, outcome) = match action {
                    RepairAction::Note(note) => {
                        pass.notes.push(format!("note: {note}"));
                        continue;
                    }
                    RepairAction::Placeholder { path, .. }
                    | RepairAction::CreateIfAbsent { path, .. }
                        if !writes_inside(layout.root(), &path) =>
                    {
                        let shown = display_relative(layout.root(), &path);
                        tracing::warn!(
                            rule = rule.name(),
                            path = %shown,
                            "Refusing repair outside the project"
                        );
                        pass.notes.push(format!(
                            "note: refused {shown}: target leads outside the project"
                        ));
                        continue;
                    }
                    RepairAction::Placeholder { path, content } => {
                        let outcome = make_file(&path, &content)?;
                        (path, outcome)
                    }
                    RepairAction::CreateIfAbsent { path, content } => {
                        let outcome = create_if_absent(&path, &content)?;
                        (path, outcome)
                    }
                };

                let line = format!("{} {}", outcome.verb(), display_relative(layout.root(), &path));
                tracing::info!(rule = rule.name(), action = %line, "Repair action");
                if outcome.changed() {
                    pass.applied.push(line);
                } else if !pass.notes.contains(&line) {
                    pass.notes.push(line);
                }
            }
        }
        Ok(pass)
    }
}

/// Ensure the smoke test exists. Returns true when it was written.
pub fn ensure_smoke_test(layout: &ProjectLayout) -> io::Result<bool> {
    match layout.smoke_test() {
        Some(path) => Ok(create_if_absent(&path, SMOKE_TEST)?.changed()),
        None => Ok(false),
    }
}

/// Remove macOS sidecar files (`._*`, `.DS_Store`) under `test/`; test
/// discovery chokes on them. Returns the removed paths.
pub fn purge_sidecar_files(layout: &ProjectLayout) -> Vec<String> {
    let test_dir = layout.root().join("test");
    if !test_dir.is_dir() {
        return Vec::new();
    }
    let mut removed = Vec::new();
    for entry in WalkDir::new(&test_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        if !(name.starts_with("._") || name == ".DS_Store") {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed.push(display_relative(layout.root(), entry.path())),
            Err(err) => tracing::warn!(
                path = %entry.path().display(),
                error = %err,
                "Could not remove sidecar file"
            ),
        }
    }
    if !removed.is_empty() {
        tracing::info!(count = removed.len(), "Purged macOS sidecar files under test/");
    }
    removed
}
