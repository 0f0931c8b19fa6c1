//! SWE-bench task plumbing.
//!
//! Everything that talks to the outside world around one benchmark task:
//! - Fetch the task descriptor from the index service
//! - Parse the clone command and prepare the local repository
//! - Submit the repository to the test harness
//! - Append the outcome to the result log

use serde::{Deserialize, Serialize};

pub mod clone_spec;
pub mod harness;
pub mod index;
pub mod repo;
pub mod report;

pub use clone_spec::{CloneParseError, CloneSpec};
pub use harness::{
    CategoryOutcome, EvaluationRequest, EvaluationResult, Evaluator, HarnessClient,
};
pub use index::{IndexClient, TaskSource};
pub use repo::{repo_dir_name, GitCli, RepoPreparer, VersionControl};
pub use report::{ResultLog, TaskRecord, TaskStatus};

/// Default base URL of the task index service.
pub const DEFAULT_INDEX_URL: &str = "http://localhost:8081";

/// Default base URL of the test harness service.
pub const DEFAULT_HARNESS_URL: &str = "http://localhost:8082";

/// Validate a git ref (commit SHA, branch name) before handing it to git.
///
/// Accepts hex-only SHAs (short or full) and standard git ref names
/// (alphanumeric, `/`, `.`, `-`, `_`). Rejects shell metacharacters,
/// `..` sequences, and refs starting with `-` (flag injection).
pub fn validate_git_ref(s: &str) -> Result<(), anyhow::Error> {
    if s.is_empty() {
        anyhow::bail!("git ref is empty");
    }
    if s.len() > 256 {
        anyhow::bail!("git ref too long ({} chars, max 256)", s.len());
    }
    if s.starts_with('-') {
        anyhow::bail!(
            "git ref '{}' must not start with '-' (could be interpreted as a flag)",
            s
        );
    }
    if s.contains("..") {
        anyhow::bail!("git ref '{}' must not contain '..'", s);
    }
    for ch in s.chars() {
        if !matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '/' | '.' | '-' | '_' | '~' | '^') {
            anyhow::bail!(
                "invalid character '{}' in git ref '{}': only alphanumeric, /, ., -, _, ~, ^ allowed",
                ch,
                s
            );
        }
    }
    Ok(())
}

/// One benchmark problem as served by the index service.
///
/// Immutable once fetched and scoped to a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Index the descriptor was fetched under.
    pub index: u32,
    /// Issue text handed to the agents.
    pub problem_statement: String,
    /// Raw clone + checkout command.
    pub git_clone: String,
    /// Tests expected to flip from failing to passing.
    pub fail_to_pass: Vec<String>,
    /// Tests expected to keep passing.
    pub pass_to_pass: Vec<String>,
    /// Canonical benchmark id, used to key harness results.
    pub instance_id: String,
}

impl TaskDescriptor {
    /// Parse the embedded clone command.
    pub fn clone_spec(&self) -> Result<CloneSpec, CloneParseError> {
        CloneSpec::parse(&self.git_clone)
    }
}
