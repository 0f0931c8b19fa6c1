//! Tool for staging changes with `git add`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{ExecutionContext, Tool, ToolError, ToolResult};
use crate::swe::VersionControl;

#[derive(Debug, Deserialize)]
struct GitAddParams {
    #[serde(default)]
    repo_path: Option<String>,
    #[serde(default)]
    file_path: Option<String>,
}

/// Tool that stages a file (or `.`) in the task repository.
pub struct GitAddTool {
    vcs: Arc<dyn VersionControl>,
}

impl GitAddTool {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self { vcs }
    }
}

#[async_trait]
impl Tool for GitAddTool {
    fn name(&self) -> &str {
        "git_add"
    }

    fn description(&self) -> &str {
        "Stage a changed file in the git repository (git add). Use '.' as file_path to stage every change."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "repo_path": {
                    "type": "string",
                    "description": "Path to the git repository (defaults to the repository root)"
                },
                "file_path": {
                    "type": "string",
                    "description": "File to stage, relative to repo_path, or '.' for all changes"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let params: GitAddParams = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        let Some(file_path) = params.file_path.filter(|p| !p.trim().is_empty()) else {
            return Ok(ToolResult::failure("Error: file_path must be provided."));
        };

        let repo = match &params.repo_path {
            Some(p) if !p.trim().is_empty() => ctx.resolve(p),
            _ => ctx.working_dir.clone(),
        };
        let target = repo.join(&file_path);
        if !target.exists() {
            return Ok(ToolResult::failure(format!(
                "File does not exist: {}",
                target.display()
            )));
        }

        debug!(repo = %repo.display(), file = %file_path, "git_add");
        match self.vcs.add(&repo, &file_path).await {
            Ok(()) => Ok(ToolResult::success(format!(
                "Added to the git staging area: {}",
                file_path
            ))),
            Err(e) => Ok(ToolResult::failure(format!(
                "Error executing git add: {}",
                e
            ))),
        }
    }
}
