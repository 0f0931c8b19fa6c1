//! Tool for running shell commands (test runners, linters) in the repository.
//!
//! Only handed to the tester agent.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{truncate, ExecutionContext, Tool, ToolError, ToolResult};

/// Maximum output length returned to the model.
const MAX_OUTPUT_LENGTH: usize = 20_000;

#[derive(Debug, Deserialize)]
struct RunCommandParams {
    command: String,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

/// Tool for executing a shell command inside the repository directory.
#[derive(Debug, Default)]
pub struct RunCommandTool;

impl RunCommandTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the repository root, e.g. 'python -m pytest tests/test_x.py'. Returns stdout, stderr and the exit code."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "description": "Optional timeout, capped by the configured limit",
                    "minimum": 1
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let params: RunCommandParams = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;
        if params.command.trim().is_empty() {
            return Err(ToolError::InvalidParameters(
                "command cannot be empty".to_string(),
            ));
        }
        if params.timeout_seconds == Some(0) {
            return Err(ToolError::InvalidParameters(
                "timeout_seconds must be at least 1".to_string(),
            ));
        }

        let limit = params
            .timeout_seconds
            .map(Duration::from_secs)
            .map_or(ctx.command_timeout, |requested| requested.min(ctx.command_timeout));
        debug!(command = %params.command, timeout_secs = limit.as_secs(), "run_command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&params.command)
            .current_dir(&ctx.working_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(limit, child).await {
            Err(_) => {
                return Err(ToolError::Timeout {
                    seconds: limit.as_secs(),
                })
            }
            Ok(Err(e)) => {
                return Ok(ToolResult::failure(format!("Failed to run command: {e}")));
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut text = stdout.to_string();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n--- stderr ---\n");
            }
            text.push_str(&stderr);
        }
        let text = truncate(&text, MAX_OUTPUT_LENGTH);

        let code = output.status.code().unwrap_or(-1);
        if code == 0 {
            Ok(ToolResult::success(text))
        } else {
            Ok(ToolResult::partial(
                text,
                format!("Command exited with code {}", code),
            ))
        }
    }
}
