//! Root confinement for sandbox paths.
//!
//! Existing paths are checked after `canonicalize`, so symlinks cannot lead
//! out of the root. Paths that do not exist yet are resolved against their
//! deepest existing ancestor and normalized lexically.

use std::path::{Component, Path, PathBuf};

use crate::error::{AiError, Result};

/// Normalize a path without touching the filesystem.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            c => result.push(c),
        }
    }
    result
}

/// Resolve `path` against the canonical `root`, rejecting anything that does
/// not end up inside it.
pub(crate) fn resolve_in_root(root: &Path, path: &str) -> Result<PathBuf> {
    let trimmed = path.trim();
    let requested = if trimmed.is_empty() {
        PathBuf::from(".")
    } else {
        PathBuf::from(trimmed)
    };
    let joined = if requested.is_absolute() {
        requested
    } else {
        root.join(requested)
    };

    let escape = |candidate: &Path| AiError::PathEscape {
        path: candidate.display().to_string(),
        root: root.display().to_string(),
    };

    // Covers dangling symlinks too: they exist as entries but cannot be
    // canonicalized, which is treated as an escape.
    if std::fs::symlink_metadata(&joined).is_ok() {
        let canonical = joined.canonicalize().map_err(|_| escape(&joined))?;
        if !canonical.starts_with(root) {
            return Err(escape(&canonical));
        }
        return Ok(canonical);
    }

    let Some((ancestor, suffix)) = find_existing_ancestor(&joined) else {
        return Err(escape(&joined));
    };
    let canonical_parent = ancestor.canonicalize().map_err(|_| escape(&ancestor))?;
    let candidate = normalize_path(&canonical_parent.join(suffix));
    if !candidate.starts_with(root) {
        return Err(escape(&candidate));
    }
    Ok(candidate)
}

/// Like [`resolve_in_root`], but a final symlink is left unresolved so the
/// link entry itself is addressed. Only the parent directory is canonicalized.
pub(crate) fn resolve_entry_in_root(root: &Path, path: &str) -> Result<PathBuf> {
    let requested = Path::new(path.trim());
    match requested.components().next_back() {
        Some(Component::Normal(name)) => {
            let parent = requested
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(resolve_in_root(root, &parent)?.join(name))
        }
        _ => resolve_in_root(root, path),
    }
}

/// Path of `absolute` relative to `root`, rendered with forward slashes.
pub(crate) fn relative_display(root: &Path, absolute: &Path) -> String {
    let relative = absolute.strip_prefix(root).unwrap_or(absolute);
    let rendered = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if rendered.is_empty() {
        ".".to_string()
    } else {
        rendered
    }
}

/// Walk up from `path` until an existing ancestor is found.
fn find_existing_ancestor(path: &Path) -> Option<(PathBuf, PathBuf)> {
    let mut ancestor = path.to_path_buf();
    loop {
        if ancestor.exists() {
            let suffix = path
                .strip_prefix(&ancestor)
                .unwrap_or_else(|_| Path::new(""))
                .to_path_buf();
            return Some((ancestor, suffix));
        }

        if !ancestor.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn canonical_root(dir: &TempDir) -> PathBuf {
        dir.path().canonicalize().unwrap()
    }

    #[test]
    fn test_relative_paths_stay_inside() {
        let dir = TempDir::new().unwrap();
        let root = canonical_root(&dir);

        let resolved = resolve_in_root(&root, "lib/new/file.dart").unwrap();
        assert_eq!(resolved, root.join("lib/new/file.dart"));

        let resolved = resolve_in_root(&root, "lib/../lib/./x.dart").unwrap();
        assert_eq!(resolved, root.join("lib/x.dart"));

        assert_eq!(resolve_in_root(&root, "").unwrap(), root);
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let root = canonical_root(&dir);

        for path in ["../outside.txt", "a/../../b", "new/dir/../../../x", "/etc/passwd"] {
            let err = resolve_in_root(&root, path).unwrap_err();
            assert!(matches!(err, AiError::PathEscape { .. }), "{path} should escape");
        }
    }

    #[test]
    fn test_absolute_path_inside_root_is_allowed() {
        let dir = TempDir::new().unwrap();
        let root = canonical_root(&dir);
        let inside = root.join("inside.txt");

        let resolved = resolve_in_root(&root, inside.to_str().unwrap()).unwrap();
        assert_eq!(resolved, inside);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let outside = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let root = canonical_root(&dir);
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        assert!(resolve_in_root(&root, "link").is_err());
        assert!(resolve_in_root(&root, "link/new.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_rejected() {
        let dir = TempDir::new().unwrap();
        let root = canonical_root(&dir);
        std::os::unix::fs::symlink("/nonexistent/target", root.join("dangling")).unwrap();

        assert!(resolve_in_root(&root, "dangling").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_resolution_keeps_final_link() {
        let outside = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let root = canonical_root(&dir);
        std::fs::create_dir(root.join("lib")).unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("lib/link")).unwrap();

        assert_eq!(
            resolve_entry_in_root(&root, "lib/link").unwrap(),
            root.join("lib/link")
        );
        assert!(resolve_entry_in_root(&root, "lib/link/inner.txt").is_err());
        assert!(resolve_entry_in_root(&root, "../x").is_err());
        assert_eq!(resolve_entry_in_root(&root, ".").unwrap(), root);
    }

    #[test]
    fn test_relative_display_uses_forward_slashes() {
        let root = PathBuf::from("/work/project");
        assert_eq!(
            relative_display(&root, &root.join("lib").join("main.dart")),
            "lib/main.dart"
        );
        assert_eq!(relative_display(&root, &root), ".");
    }
}
