//! Every tool must refuse paths that leave the project root and leave the
//! tree untouched when it does.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use forgeloop_ai::{Sandbox, ToolDispatcher};
use serde_json::{Value, json};
use tempfile::TempDir;
use walkdir::WalkDir;

fn tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().display().to_string();
            let bytes = if e.file_type().is_file() {
                fs::read(e.path()).unwrap()
            } else {
                Vec::new()
            };
            (rel, bytes)
        })
        .collect()
}

struct Fixture {
    outer: TempDir,
    dispatcher: ToolDispatcher,
}

impl Fixture {
    fn new() -> Self {
        let outer = TempDir::new().unwrap();
        let project = outer.path().join("project");
        fs::create_dir_all(project.join("lib")).unwrap();
        fs::write(project.join("lib/main.dart"), "void main() {}\n").unwrap();
        fs::write(outer.path().join("secret.txt"), "top secret").unwrap();

        let sandbox = Sandbox::new(&project).unwrap();
        Self {
            outer,
            dispatcher: ToolDispatcher::new(Arc::new(sandbox)),
        }
    }

    async fn assert_rejected(&self, tool: &str, args: Value) {
        let before = tree(self.outer.path());
        let output = self.dispatcher.dispatch(tool, args.clone()).await;
        assert!(!output.ok, "{tool} accepted {args}");
        assert!(output.error.is_some());
        assert_eq!(before, tree(self.outer.path()), "{tool} changed the tree");
    }
}

#[tokio::test]
async fn test_parent_traversal_rejected_by_every_tool() {
    let fx = Fixture::new();
    fx.assert_rejected("fs_map", json!({ "root": ".." })).await;
    fx.assert_rejected("fs_glob", json!({ "pattern": "../*.txt" })).await;
    fx.assert_rejected("fs_read", json!({ "path": "../secret.txt" })).await;
    fx.assert_rejected("fs_write", json!({ "path": "../pwned.txt", "content": "x" }))
        .await;
    fx.assert_rejected("fs_write", json!({ "path": "lib/../../pwned.txt", "content": "x" }))
        .await;
    fx.assert_rejected("fs_mkdir", json!({ "path": "../newdir" })).await;
    fx.assert_rejected("fs_delete", json!({ "path": "../secret.txt" })).await;
    fx.assert_rejected("fs_diff", json!({ "paths": ["../secret.txt"] })).await;
    fx.assert_rejected(
        "fs_diff",
        json!({ "path": "../secret.txt", "new_content": "x" }),
    )
    .await;
    fx.assert_rejected(
        "fs_patch",
        json!({ "path": "../secret.txt", "content": "overwritten" }),
    )
    .await;
}

#[tokio::test]
async fn test_absolute_paths_outside_root_rejected() {
    let fx = Fixture::new();
    let secret = fx.outer.path().join("secret.txt").display().to_string();

    fx.assert_rejected("fs_read", json!({ "path": secret })).await;
    fx.assert_rejected("fs_write", json!({ "path": secret, "content": "x" }))
        .await;
    fx.assert_rejected("fs_delete", json!({ "path": secret })).await;
    fx.assert_rejected("fs_glob", json!({ "pattern": "/etc/*" })).await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_rejected() {
    let fx = Fixture::new();
    let project = fx.dispatcher.sandbox().root().to_path_buf();
    std::os::unix::fs::symlink(fx.outer.path(), project.join("link")).unwrap();

    fx.assert_rejected("fs_read", json!({ "path": "link/secret.txt" })).await;
    fx.assert_rejected("fs_write", json!({ "path": "link/new.txt", "content": "x" }))
        .await;
    fx.assert_rejected("fs_patch", json!({ "path": "link/secret.txt", "content": "x" }))
        .await;
    assert_eq!(
        fs::read_to_string(fx.outer.path().join("secret.txt")).unwrap(),
        "top secret"
    );
}

#[tokio::test]
async fn test_inside_paths_still_work() {
    let fx = Fixture::new();
    let output = fx
        .dispatcher
        .dispatch("fs_read", json!({ "path": "lib/../lib/main.dart" }))
        .await;
    assert!(output.ok, "{:?}", output.error);
    assert_eq!(output.payload["content"], "void main() {}\n");
}
