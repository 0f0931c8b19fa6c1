//! swe-crew: multi-agent runner for SWE-bench style tasks.
//!
//! For every task index the pipeline fetches the task from an index service,
//! clones the repository at the task's commit, lets a planner / coder /
//! tester agent team attempt a fix and submits the result to a test harness.

pub mod cli;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod scaffold;
pub mod swe;

// Re-export commonly used error types
pub use error::{EvalError, FetchError, LlmError, LogError, PipelineError, RepoError};
