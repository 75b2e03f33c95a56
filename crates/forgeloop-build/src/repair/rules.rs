//! Built-in diagnostic rules for the Dart analyzer.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::paths::{AUTOFIX_DIR, class_name_for, clamp_within, fallback_for};
use super::stubs::{SMOKE_TEST, class_stub, widget_stub};
use super::{ProjectLayout, RepairAction, RepairRule};

static MISSING_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Target of URI doesn't exist|referenced target does not exist):\s*'([^']+)'")
        .expect("Invalid regex")
});

static UNDEFINED_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:The name '([A-Za-z_][A-Za-z0-9_]*)' isn't a class|Undefined class '([A-Za-z_][A-Za-z0-9_]*)')",
    )
    .expect("Invalid regex")
});

static UNDEFINED_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)The method '[A-Za-z_][A-Za-z0-9_]*' isn't defined for the type '[A-Za-z_][A-Za-z0-9_]*'",
    )
    .expect("Invalid regex")
});

/// Import of a file that does not exist: create a placeholder for it.
#[derive(Default)]
pub struct MissingTargetRule;

impl MissingTargetRule {
    /// Where a missing import should live, relative to the project root.
    fn derive_target(&self, layout: &ProjectLayout, uri: &str) -> Option<PathBuf> {
        if uri.starts_with("dart:") || uri.starts_with("package:flutter") {
            return None;
        }
        if let Some(package_path) = uri.strip_prefix("package:") {
            let (_, rest) = package_path.split_once('/')?;
            return Some(Path::new("lib").join(rest));
        }
        Some(layout.import_anchor().join(uri))
    }
}

impl RepairRule for MissingTargetRule {
    fn name(&self) -> &'static str {
        "missing_target"
    }

    fn plan(&self, diagnostics: &str, layout: &ProjectLayout) -> Vec<RepairAction> {
        let mut actions = Vec::new();
        for captures in MISSING_TARGET.captures_iter(diagnostics) {
            let uri = &captures[1];
            let Some(desired) = self.derive_target(layout, uri) else {
                tracing::debug!(uri, "Skipping SDK or framework import");
                continue;
            };
            let Some(path) = clamp_within(layout.root(), &desired, &fallback_for(uri)) else {
                actions.push(RepairAction::Note(format!(
                    "no safe location for missing import {uri}"
                )));
                continue;
            };
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let class_name = class_name_for(&file_name);
            let content = if file_name.ends_with("_view.dart") {
                widget_stub(&class_name)
            } else {
                class_stub(&class_name)
            };
            actions.push(RepairAction::Placeholder { path, content });
        }
        actions
    }
}

/// Reference to a class that is not declared anywhere: add a stub class.
#[derive(Default)]
pub struct UndefinedClassRule;

impl RepairRule for UndefinedClassRule {
    fn name(&self) -> &'static str {
        "undefined_class"
    }

    fn plan(&self, diagnostics: &str, layout: &ProjectLayout) -> Vec<RepairAction> {
        let mut actions = Vec::new();
        for captures in UNDEFINED_CLASS.captures_iter(diagnostics) {
            let Some(class) = captures.get(1).or_else(|| captures.get(2)) else {
                continue;
            };
            let class = class.as_str();
            let relative = format!("{AUTOFIX_DIR}/{}.dart", class.to_lowercase());
            if let Some(path) = clamp_within(layout.root(), Path::new(&relative), &relative) {
                actions.push(RepairAction::Placeholder {
                    path,
                    content: class_stub(class),
                });
            }
        }
        actions
    }
}

/// Undefined methods are reported but never edited.
#[derive(Default)]
pub struct UndefinedMethodRule;

impl RepairRule for UndefinedMethodRule {
    fn name(&self) -> &'static str {
        "undefined_method"
    }

    fn plan(&self, diagnostics: &str, _layout: &ProjectLayout) -> Vec<RepairAction> {
        if UNDEFINED_METHOD.is_match(diagnostics) {
            vec![RepairAction::Note(
                "undefined method(s) detected; not auto-fixed".to_string(),
            )]
        } else {
            Vec::new()
        }
    }
}

/// Keeps a runnable smoke test around for the verify step.
#[derive(Default)]
pub struct SmokeTestRule;

impl RepairRule for SmokeTestRule {
    fn name(&self) -> &'static str {
        "smoke_test"
    }

    fn plan(&self, _diagnostics: &str, layout: &ProjectLayout) -> Vec<RepairAction> {
        layout
            .smoke_test()
            .map(|path| RepairAction::CreateIfAbsent {
                path,
                content: SMOKE_TEST.to_string(),
            })
            .into_iter()
            .collect()
    }
}
