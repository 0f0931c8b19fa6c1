//! Tool for locating a file by name inside a directory tree.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::{ExecutionContext, Tool, ToolError, ToolResult};

#[derive(Debug, Deserialize)]
struct FindFileParams {
    #[serde(default)]
    directory: Option<String>,
    filename: String,
    #[serde(default = "default_recursive")]
    recursive: bool,
}

fn default_recursive() -> bool {
    true
}

/// Tool that walks a directory and returns the first file with a given name.
#[derive(Debug, Default)]
pub struct FindFileTool;

impl FindFileTool {
    pub fn new() -> Self {
        Self
    }
}

/// Search `root` level by level and return the first file named `filename`.
///
/// All files of a directory are checked before any of its subdirectories,
/// so a match closer to `root` always wins. Entries are visited in sorted
/// order so the result is deterministic. Symlinked directories are not
/// followed. Non-recursive mode only inspects the top level of `root`.
pub fn find_file(root: &Path, filename: &str, recursive: bool) -> Option<PathBuf> {
    let mut pending = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = pending.pop_front() {
        let mut subdirs = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let file_type = entry.file_type();
            if file_type.is_file() && entry.file_name() == filename {
                return Some(entry.into_path());
            }
            if recursive && file_type.is_dir() {
                subdirs.push(entry.into_path());
            }
        }
        pending.extend(subdirs);
    }

    None
}

#[async_trait]
impl Tool for FindFileTool {
    fn name(&self) -> &str {
        "find_file"
    }

    fn description(&self) -> &str {
        "Search a directory for a file by name and return its full path. Searches subdirectories unless recursive is false."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Directory to search in (defaults to the repository root)"
                },
                "filename": {
                    "type": "string",
                    "description": "Exact file name to look for, e.g. 'models.py'"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Whether to search subdirectories (default: true)"
                }
            },
            "required": ["filename"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let params: FindFileParams = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;
        if params.filename.trim().is_empty() {
            return Err(ToolError::InvalidParameters(
                "filename cannot be empty".to_string(),
            ));
        }

        let directory = params.directory.unwrap_or_else(|| ".".to_string());
        let root = ctx.resolve(&directory);
        debug!(root = %root.display(), filename = %params.filename, "find_file");

        if !root.is_dir() {
            return Ok(ToolResult::failure(format!(
                "Directory not found: {}",
                directory
            )));
        }

        let filename = params.filename.clone();
        let recursive = params.recursive;
        let found = tokio::task::spawn_blocking(move || find_file(&root, &filename, recursive))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("search task failed: {e}")))?;

        match found {
            Some(path) => {
                let absolute = std::fs::canonicalize(&path).unwrap_or(path);
                Ok(ToolResult::success(absolute.display().to_string()))
            }
            None => Ok(ToolResult::failure(format!(
                "File '{}' not found in {}",
                params.filename, directory
            ))),
        }
    }
}
