//! Sequential task pipeline.
//!
//! For each task index: fetch the descriptor, clone and check out the
//! repository, let the agent team attempt a fix, submit the repository to the
//! harness, and append the outcome to the result log.
//!
//! - **Config**: endpoints, paths, team settings and timeouts
//! - **Context**: per-run state (run id, log sink, original working directory)
//! - **Runner**: the per-task stages and the range loop
//!
//! # Example
//!
//! ```rust,ignore
//! use swe_crew::pipeline::{Pipeline, PipelineConfig, RunContext};
//! use swe_crew::swe::ResultLog;
//!
//! let config = PipelineConfig::new().with_max_turns(30);
//! let pipeline = Pipeline::from_config(&config, llm)?;
//! let ctx = RunContext::new(ResultLog::new(&config.log_file))?;
//! let summary = pipeline.run_range(1..=300, &ctx).await;
//! println!("{} resolved of {}", summary.resolved, summary.attempted);
//! ```

pub mod config;
pub mod context;
pub mod runner;

pub use config::{ConfigError, PipelineConfig};
pub use context::{RunContext, WorkdirGuard};
pub use runner::{Pipeline, RunSummary};
