//! Append-only result logging.
//!
//! Two sinks:
//! - the human-readable log file, one `--- TESTCASE <n> ---` block per task
//! - an optional JSONL report with one [`TaskRecord`] per task
//!
//! Both are opened in append mode for every write and never truncated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::EvaluationResult;
use crate::error::LogError;

/// Final state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Every designated test passed.
    Resolved,
    /// Evaluated, but at least one test failed.
    Unresolved,
    /// Some stage failed before a result could be produced.
    Error,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::Unresolved => write!(f, "unresolved"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Machine-readable record of one task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub run_id: Uuid,
    pub index: u32,
    pub instance_id: Option<String>,
    pub status: TaskStatus,
    pub fail_to_pass: Option<String>,
    pub pass_to_pass: Option<String>,
    pub agent_turns: Option<usize>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Writer for the shared result log (and optional JSONL report).
#[derive(Debug, Clone)]
pub struct ResultLog {
    path: PathBuf,
    report_path: Option<PathBuf>,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            report_path: None,
        }
    }

    /// Also append a JSONL [`TaskRecord`] per task to `report_path`.
    pub fn with_report(mut self, report_path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(report_path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the pass-count summary for a successfully evaluated task.
    pub fn log_result(&self, index: u32, result: &EvaluationResult) -> Result<(), LogError> {
        append(&self.path, &format_summary(index, result))
    }

    /// Append an error block for a failed task.
    pub fn log_error(&self, index: u32, error: &str) -> Result<(), LogError> {
        append(&self.path, &format_error(index, error))
    }

    /// Append a JSONL record, if a report file is configured.
    pub fn record(&self, record: &TaskRecord) -> Result<(), LogError> {
        match &self.report_path {
            Some(path) => {
                let mut line = serde_json::to_string(record)?;
                line.push('\n');
                append(path, &line)
            }
            None => Ok(()),
        }
    }
}

fn header(index: u32) -> String {
    format!("\n--- TESTCASE {index} ---\n")
}

/// Summary block for an evaluated task.
pub fn format_summary(index: u32, result: &EvaluationResult) -> String {
    format!(
        "{}FAIL_TO_PASS passed: {}\nPASS_TO_PASS passed: {}\n",
        header(index),
        result.fail_to_pass.ratio(),
        result.pass_to_pass.ratio()
    )
}

/// Error block for a failed task.
pub fn format_error(index: u32, error: &str) -> String {
    format!("{}Error: {}\n", header(index), error)
}

fn append(path: &Path, text: &str) -> Result<(), LogError> {
    let to_log_error = |source| LogError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(to_log_error)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_log_error)?;
    file.write_all(text.as_bytes()).map_err(to_log_error)
}
