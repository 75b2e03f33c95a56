//! Typed tool invocations.
//!
//! Each tool name maps to exactly one variant with a strongly typed argument
//! structure. Raw `(name, arguments)` pairs from the model are validated here,
//! before any handler runs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ToolSchema;
use crate::error::{AiError, Result};

fn default_root() -> String {
    ".".to_string()
}

fn default_max_depth() -> usize {
    4
}

fn default_max_matches() -> usize {
    1000
}

fn default_max_bytes() -> usize {
    200_000
}

fn default_true() -> bool {
    true
}

fn default_preview_chars() -> usize {
    400
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FsMapArgs {
    /// Directory to list, relative to the project root.
    #[serde(default = "default_root")]
    pub root: String,
    /// How many directory levels to descend (0-10).
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Inline the content of small UTF-8 files.
    #[serde(default)]
    pub include_content: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FsGlobArgs {
    /// Glob pattern relative to the project root, e.g. `lib/**/*.dart`.
    pub pattern: String,
    /// Maximum number of matches to return (at most 1000).
    #[serde(default = "default_max_matches")]
    pub max_matches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FsReadArgs {
    pub path: String,
    /// Read at most this many bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Overwrite,
    Append,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FsWriteArgs {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub mode: WriteMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FsMkdirArgs {
    pub path: String,
    /// Succeed when the directory already exists.
    #[serde(default = "default_true")]
    pub exist_ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FsDeleteArgs {
    pub path: String,
    /// Required to delete a non-empty directory.
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FsDiffArgs {
    /// Files to summarize. Defaults to every file in the project.
    #[serde(default)]
    pub paths: Option<Vec<String>>,
    /// With `new_content`: the file to diff against the proposed content.
    #[serde(default)]
    pub path: Option<String>,
    /// Proposed content for `path`. Nothing is written.
    #[serde(default)]
    pub new_content: Option<String>,
    /// Characters of each file shown in a snapshot.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatchEdit {
    /// Text (or regular expression when `regex` is set) to find.
    pub find: String,
    pub replace: String,
    #[serde(default)]
    pub regex: bool,
    /// Replace at most this many occurrences; 0 replaces all.
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FsPatchArgs {
    pub path: String,
    /// Applied in order; all must match or none is applied.
    #[serde(default)]
    pub edits: Vec<PatchEdit>,
    /// Wholesale replacement used when no edits are given or an edit fails.
    #[serde(default)]
    pub content: Option<String>,
}

/// A validated tool call.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolInvocation {
    FsMap(FsMapArgs),
    FsGlob(FsGlobArgs),
    FsRead(FsReadArgs),
    FsWrite(FsWriteArgs),
    FsMkdir(FsMkdirArgs),
    FsDelete(FsDeleteArgs),
    FsDiff(FsDiffArgs),
    FsPatch(FsPatchArgs),
}

pub const TOOL_NAMES: [&str; 8] = [
    "fs_map", "fs_glob", "fs_read", "fs_write", "fs_mkdir", "fs_delete", "fs_diff", "fs_patch",
];

impl ToolInvocation {
    /// Validate a raw call. Unknown names and malformed arguments are errors.
    pub fn parse(name: &str, arguments: Value) -> Result<Self> {
        if !TOOL_NAMES.contains(&name) {
            return Err(AiError::ToolNotFound(name.to_string()));
        }
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        serde_json::from_value(json!({ "tool": name, "args": arguments })).map_err(|err| {
            AiError::InvalidArguments {
                tool: name.to_string(),
                message: err.to_string(),
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::FsMap(_) => "fs_map",
            ToolInvocation::FsGlob(_) => "fs_glob",
            ToolInvocation::FsRead(_) => "fs_read",
            ToolInvocation::FsWrite(_) => "fs_write",
            ToolInvocation::FsMkdir(_) => "fs_mkdir",
            ToolInvocation::FsDelete(_) => "fs_delete",
            ToolInvocation::FsDiff(_) => "fs_diff",
            ToolInvocation::FsPatch(_) => "fs_patch",
        }
    }

    /// Whether the call changes the filesystem.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ToolInvocation::FsWrite(_)
                | ToolInvocation::FsMkdir(_)
                | ToolInvocation::FsDelete(_)
                | ToolInvocation::FsPatch(_)
        )
    }
}

fn parameters_for<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    value
}

fn schema<T: JsonSchema>(name: &str, description: &str) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        description: description.to_string(),
        parameters: parameters_for::<T>(),
    }
}

/// Schemas for every tool, in a stable order.
pub fn tool_schemas() -> Vec<ToolSchema> {
    vec![
        schema::<FsMapArgs>(
            "fs_map",
            "List files and directories under a project directory up to a bounded depth.",
        ),
        schema::<FsGlobArgs>("fs_glob", "Find project paths matching a glob pattern."),
        schema::<FsReadArgs>("fs_read", "Read a UTF-8 text file, truncated to a byte limit."),
        schema::<FsWriteArgs>(
            "fs_write",
            "Write or append to a file, creating parent directories as needed.",
        ),
        schema::<FsMkdirArgs>("fs_mkdir", "Create a directory and its parents."),
        schema::<FsDeleteArgs>(
            "fs_delete",
            "Delete a file or directory. Protected names such as .git cannot be deleted.",
        ),
        schema::<FsDiffArgs>(
            "fs_diff",
            "Summarize project files (count, bytes, previews) or diff a file against proposed content.",
        ),
        schema::<FsPatchArgs>(
            "fs_patch",
            "Apply find/replace edits to one file, or replace it wholesale with `content`.",
        ),
    ]
}
