//! File tools for reading and writing repository files.
//!
//! - `ReadFileTool`: return a file's contents verbatim
//! - `WriteFileTool`: replace a file's entire contents atomically

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ExecutionContext, Tool, ToolError, ToolResult};

/// Maximum file size that can be read or written (1MB).
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Validate a tool-supplied path.
fn validate_path(path: &str) -> Result<(), ToolError> {
    if path.trim().is_empty() {
        return Err(ToolError::InvalidParameters(
            "Path cannot be empty".to_string(),
        ));
    }
    if path.contains('\0') {
        return Err(ToolError::InvalidParameters(
            "Path contains invalid null character".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// ReadFileTool
// ============================================================================

#[derive(Debug, Deserialize)]
struct ReadFileParams {
    path: String,
}

/// Tool for reading file contents.
#[derive(Debug, Default)]
pub struct ReadFileTool;

impl ReadFileTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the complete contents of a file. Paths are relative to the repository root unless absolute."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let params: ReadFileParams = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;
        validate_path(&params.path)?;

        let path = ctx.resolve(&params.path);
        debug!(path = %path.display(), "read_file");

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ToolResult::failure(format!(
                    "File not found: {}",
                    params.path
                )));
            }
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "Error reading file {}: {}",
                    params.path, e
                )));
            }
        };
        if metadata.is_dir() {
            return Ok(ToolResult::failure(format!(
                "Path is a directory, not a file: {}",
                params.path
            )));
        }
        if metadata.len() > MAX_FILE_SIZE {
            return Ok(ToolResult::failure(format!(
                "File size ({} bytes) exceeds maximum allowed ({} bytes)",
                metadata.len(),
                MAX_FILE_SIZE
            )));
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::success(content)),
            Err(e) => Ok(ToolResult::failure(format!(
                "Error reading file {}: {}",
                params.path, e
            ))),
        }
    }
}

// ============================================================================
// WriteFileTool
// ============================================================================

#[derive(Debug, Deserialize)]
struct WriteFileParams {
    path: Option<String>,
    content: Option<String>,
}

/// Tool for replacing a file's entire contents.
#[derive(Debug, Default)]
pub struct WriteFileTool;

impl WriteFileTool {
    pub fn new() -> Self {
        Self
    }
}

/// Write `content` to a temporary sibling of `path`, then rename it over `path`.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Ok(existing) = std::fs::metadata(path) {
        // keep the executable bit and friends of the file being replaced
        std::fs::set_permissions(tmp.path(), existing.permissions())?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write or overwrite a complete file with the given content. The whole file is replaced, so always pass the complete file content."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Complete new content of the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let params: WriteFileParams = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        let (Some(rel_path), Some(content)) = (params.path, params.content) else {
            return Ok(ToolResult::failure(
                "Error: 'path' and 'content' must both be provided.",
            ));
        };
        validate_path(&rel_path)?;

        if content.len() as u64 > MAX_FILE_SIZE {
            return Ok(ToolResult::failure(format!(
                "Content size ({} bytes) exceeds maximum allowed ({} bytes)",
                content.len(),
                MAX_FILE_SIZE
            )));
        }

        let path = ctx.resolve(&rel_path);
        debug!(path = %path.display(), bytes = content.len(), "write_file");

        let target = path.clone();
        let outcome = tokio::task::spawn_blocking(move || write_atomic(&target, &content))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("write task failed: {e}")))?;

        match outcome {
            Ok(()) => Ok(ToolResult::success(format!(
                "File written successfully: {}",
                rel_path
            ))),
            Err(e) => Ok(ToolResult::failure(format!(
                "Error writing file {}: {}",
                rel_path, e
            ))),
        }
    }
}
