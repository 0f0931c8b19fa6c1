//! Error types for swe-crew operations.
//!
//! Defines error types for the subsystems that make up one pipeline run:
//! - Task fetching from the index service
//! - Repository preparation (clone / checkout)
//! - Harness evaluation
//! - Result logging
//! - LLM API interactions
//!
//! [`PipelineError`] unifies them for the per-task handler.

use thiserror::Error;

use crate::scaffold::AgentError;
use crate::swe::clone_spec::CloneParseError;

/// Errors that can occur while fetching a task descriptor.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid response: {status}")]
    Status { status: u16 },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to decode task descriptor: {0}")]
    Decode(String),

    #[error("Missing required field '{0}' in task descriptor")]
    MissingField(&'static str),
}

/// Errors that can occur while preparing the local repository.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Command '{command}' exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Command '{command}' timed out after {seconds} seconds")]
    Timeout { command: String, seconds: u64 },

    #[error("Failed to spawn git: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while evaluating a repository with the harness.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Harness returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid harness data: {0}")]
    Data(String),
}

/// Errors that can occur while appending to the result log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to write log file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Any failure of a single task's pipeline.
///
/// Each variant maps to one stage; the message is what ends up in the
/// `Error:` line of the result log.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid clone command: {0}")]
    CloneCommand(#[from] CloneParseError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("Agent run failed: {0}")]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Log(#[from] LogError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_status_message_carries_code() {
        let err = FetchError::Status { status: 404 };
        assert_eq!(err.to_string(), "Invalid response: 404");
    }

    #[test]
    fn pipeline_error_is_transparent_for_fetch() {
        let err: PipelineError = FetchError::Status { status: 500 }.into();
        assert_eq!(err.to_string(), "Invalid response: 500");
    }

    #[test]
    fn repo_error_mentions_command() {
        let err = RepoError::CommandFailed {
            command: "git checkout abc".to_string(),
            code: 128,
            stderr: "fatal: reference is not a tree".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("git checkout abc"));
        assert!(msg.contains("128"));
    }

    #[test]
    fn eval_data_error_message() {
        let err: PipelineError = EvalError::Data("empty harnessOutput".to_string()).into();
        assert_eq!(err.to_string(), "Invalid harness data: empty harnessOutput");
    }
}
