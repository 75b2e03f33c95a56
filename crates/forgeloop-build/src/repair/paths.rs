use std::fs;
use std::path::{Component, Path, PathBuf};

/// Directory, relative to the project root, that receives placeholders whose
/// derived location would leave the project.
pub const AUTOFIX_DIR: &str = "lib/shared/autofix";

/// Lexically normalize `path`, folding `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve symlinks in the longest existing prefix of `path`. `None` when
/// that prefix is a link that cannot be resolved, such as a dangling one.
fn resolve_existing_prefix(path: &Path) -> Option<PathBuf> {
    let mut current = path;
    let mut rest = Vec::new();
    loop {
        if fs::symlink_metadata(current).is_ok() {
            let canonical = current.canonicalize().ok()?;
            return Some(
                rest.iter()
                    .rev()
                    .fold(canonical, |acc, part: &&std::ffi::OsStr| acc.join(part)),
            );
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                current = parent;
            }
            _ => return Some(path.to_path_buf()),
        }
    }
}

fn resolve_within(root: &Path, path: &Path) -> Option<PathBuf> {
    let resolved = resolve_existing_prefix(&normalize(&root.join(path)))?;
    (resolved.starts_with(root) && resolved != root).then_some(resolved)
}

/// Whether a write to `path` lands under `root` once every link on the way
/// is followed.
pub fn writes_inside(root: &Path, path: &Path) -> bool {
    resolve_within(root, path).is_some()
}

/// Keep `desired` if it stays under `root`, otherwise substitute
/// `root/<fallback_rel>`. `None` when even the fallback resolves outside
/// the root. `root` must be canonical.
pub fn clamp_within(root: &Path, desired: &Path, fallback_rel: &str) -> Option<PathBuf> {
    if let Some(resolved) = resolve_within(root, desired) {
        return Some(resolved);
    }
    let fallback = resolve_within(root, Path::new(fallback_rel));
    tracing::warn!(
        desired = %desired.display(),
        fallback = ?fallback,
        "Repair target escapes the project, using fallback"
    );
    fallback
}

/// `root/<AUTOFIX_DIR>/<file name of reference>`.
pub fn fallback_for(reference: &str) -> String {
    let name = Path::new(reference)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "placeholder.dart".to_string());
    format!("{AUTOFIX_DIR}/{name}")
}

/// `home_view.dart` becomes `HomeView`.
pub fn class_name_for(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name: String = stem
        .split(|c: char| c == '_' || c == '-' || c == '.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect();
    name.retain(|c| c.is_ascii_alphanumeric() || c == '_');
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        name.insert_str(0, "Autofix");
    }
    name
}

/// Path relative to `root` with forward slashes, for reports.
pub(crate) fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
