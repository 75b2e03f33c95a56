//! Root-confined filesystem operations.
//!
//! Every path is interpreted relative to the project root and resolved with
//! [`path::resolve_in_root`] before anything is read or written, so a
//! rejected call leaves the tree untouched.

mod diff;
mod path;

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{Value, json};
use walkdir::WalkDir;

use crate::error::{AiError, Result};
use crate::tools::{
    FsDeleteArgs, FsDiffArgs, FsGlobArgs, FsMapArgs, FsMkdirArgs, FsPatchArgs, FsReadArgs,
    FsWriteArgs, PatchEdit, ToolInvocation, WriteMode,
};

use diff::{SnapshotEntry, preview, render_snapshot, unified_diff};
use path::{normalize_path, relative_display, resolve_entry_in_root, resolve_in_root};

/// Names that can never be deleted and are skipped by directory walks.
pub const FORBIDDEN_NAMES: [&str; 5] = [".git", ".venv", "__pycache__", ".tox", ".mypy_cache"];

/// Size and count limits applied by the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    pub max_map_depth: usize,
    pub max_map_entries: usize,
    pub max_inline_bytes: u64,
    pub max_glob_matches: usize,
    pub max_read_bytes: usize,
    pub max_snapshot_files: usize,
    pub max_snapshot_listed: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_map_depth: 10,
            max_map_entries: 2000,
            max_inline_bytes: 64 * 1024,
            max_glob_matches: 1000,
            max_read_bytes: 2_000_000,
            max_snapshot_files: 2000,
            max_snapshot_listed: 50,
        }
    }
}

/// Filesystem executor confined to one project root.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    limits: SandboxLimits,
}

impl Sandbox {
    /// Create a sandbox over `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.canonicalize()?,
            limits: SandboxLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller supplied path, rejecting escapes.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        resolve_in_root(&self.root, path)
    }

    pub fn execute(&self, invocation: ToolInvocation) -> Result<Value> {
        match invocation {
            ToolInvocation::FsMap(args) => self.map(&args),
            ToolInvocation::FsGlob(args) => self.glob(&args),
            ToolInvocation::FsRead(args) => self.read(&args),
            ToolInvocation::FsWrite(args) => self.write(&args),
            ToolInvocation::FsMkdir(args) => self.mkdir(&args),
            ToolInvocation::FsDelete(args) => self.delete(&args),
            ToolInvocation::FsDiff(args) => self.diff(&args),
            ToolInvocation::FsPatch(args) => self.patch(&args),
        }
    }

    fn display(&self, path: &Path) -> String {
        relative_display(&self.root, path)
    }

    fn walk(&self, start: &Path, max_depth: usize) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(start)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_forbidden_name(&entry.file_name().to_string_lossy()))
            .filter_map(|entry| entry.ok())
    }

    pub fn map(&self, args: &FsMapArgs) -> Result<Value> {
        let start = self.resolve(&args.root)?;
        if !start.is_dir() {
            return Err(AiError::Tool(format!("not a directory: {}", args.root)));
        }
        let depth = args.max_depth.min(self.limits.max_map_depth);

        let mut entries = Vec::new();
        let mut truncated = false;
        if depth > 0 {
            for entry in self.walk(&start, depth) {
                if entries.len() >= self.limits.max_map_entries {
                    truncated = true;
                    break;
                }
                let file_type = entry.file_type();
                let kind = if file_type.is_dir() {
                    "dir"
                } else if file_type.is_symlink() {
                    "symlink"
                } else {
                    "file"
                };
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                let mut item = json!({
                    "path": self.display(entry.path()),
                    "type": kind,
                    "size": size,
                });
                if args.include_content
                    && file_type.is_file()
                    && size <= self.limits.max_inline_bytes
                    && let Ok(bytes) = fs::read(entry.path())
                    && let Ok(text) = String::from_utf8(bytes)
                {
                    item["content"] = Value::String(text);
                }
                entries.push(item);
            }
        }

        Ok(json!({
            "root": self.display(&start),
            "max_depth": depth,
            "count": entries.len(),
            "truncated": truncated,
            "entries": entries,
        }))
    }

    pub fn glob(&self, args: &FsGlobArgs) -> Result<Value> {
        let pattern = args.pattern.trim().trim_start_matches("./");
        if pattern.is_empty() {
            return Err(AiError::Tool("glob pattern must not be empty".to_string()));
        }
        if Path::new(pattern).is_absolute() || pattern.split('/').any(|part| part == "..") {
            return Err(AiError::PathEscape {
                path: pattern.to_string(),
                root: self.root.display().to_string(),
            });
        }
        let limit = args.max_matches.clamp(1, self.limits.max_glob_matches);

        let mut matches = Vec::new();
        let mut truncated = false;
        let prefix = literal_prefix(pattern);
        let start = normalize_path(&self.root.join(&prefix));
        // The walk never follows links, so a prefix that only resolves
        // through one (or is forbidden) has no matches.
        let walkable = prefix.split('/').all(|part| !is_forbidden_name(part))
            && fs::symlink_metadata(&start).is_ok_and(|m| m.is_dir())
            && self.resolve(&prefix).is_ok_and(|resolved| resolved == start);
        if walkable && !prefix.is_empty() && glob_match::glob_match(pattern, &prefix) {
            matches.push(prefix.clone());
        }
        let entries = walkable
            .then(|| self.walk(&start, usize::MAX))
            .into_iter()
            .flatten();
        for entry in entries {
            let relative = self.display(entry.path());
            if !glob_match::glob_match(pattern, &relative) {
                continue;
            }
            if matches.len() >= limit {
                truncated = true;
                break;
            }
            matches.push(relative);
        }

        Ok(json!({
            "pattern": pattern,
            "count": matches.len(),
            "truncated": truncated,
            "matches": matches,
        }))
    }

    pub fn read(&self, args: &FsReadArgs) -> Result<Value> {
        let path = self.resolve(&args.path)?;
        let metadata = fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(AiError::Tool(format!("not a file: {}", args.path)));
        }
        let limit = args.max_bytes.clamp(1, self.limits.max_read_bytes);

        let mut buffer = Vec::with_capacity(limit.min(metadata.len() as usize));
        fs::File::open(&path)?
            .take(limit as u64)
            .read_to_end(&mut buffer)?;

        Ok(json!({
            "path": self.display(&path),
            "size": metadata.len(),
            "truncated": metadata.len() > buffer.len() as u64,
            "content": String::from_utf8_lossy(&buffer),
        }))
    }

    pub fn write(&self, args: &FsWriteArgs) -> Result<Value> {
        let path = self.resolve(&args.path)?;
        if path == self.root || path.is_dir() {
            return Err(AiError::Tool(format!("cannot write to a directory: {}", args.path)));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match args.mode {
            WriteMode::Overwrite => fs::write(&path, &args.content)?,
            WriteMode::Append => {
                let mut file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)?;
                file.write_all(args.content.as_bytes())?;
            }
        }

        Ok(json!({
            "path": self.display(&path),
            "bytes_written": args.content.len(),
            "mode": args.mode,
        }))
    }

    pub fn mkdir(&self, args: &FsMkdirArgs) -> Result<Value> {
        let path = self.resolve(&args.path)?;
        if path.exists() {
            if path.is_dir() && args.exist_ok {
                return Ok(json!({ "path": self.display(&path), "created": false }));
            }
            return Err(AiError::Tool(format!("already exists: {}", args.path)));
        }
        fs::create_dir_all(&path)?;
        Ok(json!({ "path": self.display(&path), "created": true }))
    }

    pub fn delete(&self, args: &FsDeleteArgs) -> Result<Value> {
        let path = resolve_entry_in_root(&self.root, &args.path)?;
        if path == self.root {
            return Err(AiError::Forbidden(".".to_string()));
        }
        let relative = self.display(&path);
        if relative.split('/').any(is_forbidden_name) {
            return Err(AiError::Forbidden(relative));
        }

        let metadata = fs::symlink_metadata(&path)?;
        if metadata.is_dir() {
            if args.recursive {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_dir(&path).map_err(|err| {
                    AiError::Tool(format!(
                        "cannot delete directory {relative} without recursive=true: {err}"
                    ))
                })?;
            }
        } else {
            fs::remove_file(&path)?;
        }

        Ok(json!({ "path": relative, "deleted": true }))
    }

    pub fn diff(&self, args: &FsDiffArgs) -> Result<Value> {
        if let (Some(path), Some(new_content)) = (&args.path, &args.new_content) {
            return self.diff_file(path, new_content);
        }

        let mut listed = Vec::new();
        for path in args.paths.iter().flatten() {
            listed.push(self.resolve(path)?);
        }
        // Without explicit paths the tree is walked lazily, up to the cap.
        let walked = args
            .paths
            .is_none()
            .then(|| {
                self.walk(&self.root, usize::MAX)
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
            })
            .into_iter()
            .flatten();

        let mut entries = Vec::new();
        for file in listed.into_iter().chain(walked).filter(|p| p.is_file()) {
            if entries.len() >= self.limits.max_snapshot_files {
                break;
            }
            let bytes = fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
            let text = read_prefix(&file, args.preview_chars.saturating_mul(4))?;
            entries.push(SnapshotEntry {
                path: self.display(&file),
                bytes,
                preview: preview(&text, args.preview_chars),
            });
        }

        let total_bytes: u64 = entries.iter().map(|e| e.bytes).sum();
        Ok(json!({
            "kind": "snapshot",
            "file_count": entries.len(),
            "total_bytes": total_bytes,
            "text": render_snapshot(&entries, self.limits.max_snapshot_listed),
        }))
    }

    fn diff_file(&self, path: &str, new_content: &str) -> Result<Value> {
        let resolved = self.resolve(path)?;
        let current = if resolved.is_file() {
            String::from_utf8_lossy(&fs::read(&resolved)?).into_owned()
        } else {
            String::new()
        };
        let label = self.display(&resolved);
        let text = unified_diff(&label, &current, new_content);

        Ok(json!({
            "kind": "unified",
            "path": label,
            "changed": !text.is_empty(),
            "text": text,
        }))
    }

    pub fn patch(&self, args: &FsPatchArgs) -> Result<Value> {
        let path = self.resolve(&args.path)?;
        if path.is_dir() {
            return Err(AiError::Tool(format!("cannot patch a directory: {}", args.path)));
        }
        let label = self.display(&path);

        if !path.exists() || args.edits.is_empty() {
            let Some(content) = &args.content else {
                return Err(AiError::Tool(if path.exists() {
                    "fs_patch needs `edits` or `content`".to_string()
                } else {
                    format!("file not found: {}", args.path)
                }));
            };
            return self.replace_whole(&path, label, content);
        }

        let original = fs::read_to_string(&path)?;
        match apply_edits(&original, &args.edits) {
            Ok((patched, replacements)) => {
                if patched != original {
                    fs::write(&path, &patched)?;
                }
                Ok(json!({
                    "path": label,
                    "strategy": "edits",
                    "replacements": replacements,
                    "changed": patched != original,
                }))
            }
            Err(reason) => match &args.content {
                Some(content) => {
                    tracing::debug!(path = %label, %reason, "Patch edits failed, replacing file");
                    self.replace_whole(&path, label, content)
                }
                None => Err(AiError::Tool(reason)),
            },
        }
    }

    fn replace_whole(&self, path: &Path, label: String, content: &str) -> Result<Value> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(json!({
            "path": label,
            "strategy": "replace",
            "changed": true,
        }))
    }
}

fn is_forbidden_name(name: &str) -> bool {
    FORBIDDEN_NAMES.contains(&name)
}

/// Leading directories of a glob pattern that contain no wildcards.
fn literal_prefix(pattern: &str) -> String {
    let mut parts: Vec<&str> = pattern.split('/').collect();
    parts.pop();
    parts
        .into_iter()
        .filter(|part| !part.is_empty() && *part != ".")
        .take_while(|part| !part.contains(['*', '?', '[', '{']))
        .collect::<Vec<_>>()
        .join("/")
}

fn read_prefix(path: &Path, max_bytes: usize) -> Result<String> {
    let mut buffer = Vec::new();
    fs::File::open(path)?
        .take(max_bytes as u64)
        .read_to_end(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Apply every edit in order. Fails without side effects if any edit does
/// not match.
fn apply_edits(
    original: &str,
    edits: &[PatchEdit],
) -> std::result::Result<(String, usize), String> {
    let mut text = original.to_string();
    let mut replacements = 0;

    for (index, edit) in edits.iter().enumerate() {
        if edit.find.is_empty() {
            return Err(format!("edit {index}: empty `find`"));
        }
        if edit.regex {
            let pattern = Regex::new(&edit.find)
                .map_err(|err| format!("edit {index}: invalid regex: {err}"))?;
            let found = pattern.find_iter(&text).count();
            if found == 0 {
                return Err(format!("edit {index}: pattern not found: {}", edit.find));
            }
            replacements += if edit.count == 0 { found } else { found.min(edit.count) };
            text = pattern
                .replacen(&text, edit.count, edit.replace.as_str())
                .into_owned();
        } else {
            let found = text.matches(edit.find.as_str()).count();
            if found == 0 {
                return Err(format!("edit {index}: text not found: {}", edit.find));
            }
            if edit.count == 0 {
                replacements += found;
                text = text.replace(edit.find.as_str(), &edit.replace);
            } else {
                replacements += found.min(edit.count);
                text = text.replacen(edit.find.as_str(), &edit.replace, edit.count);
            }
        }
    }

    Ok((text, replacements))
}
