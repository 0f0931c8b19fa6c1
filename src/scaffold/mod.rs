//! Scaffold system for agent execution.
//!
//! The scaffold provides tools to the LLM and manages the agent loop:
//! 1. Get LLM action
//! 2. Parse action (tool call)
//! 3. Execute tool
//! 4. Record observation
//! 5. Check termination
//!
//! [`AgentTeam`] wires three such loops (planner, coder, tester) into a team
//! that attempts one fix per task.
//!
//! # Example
//!
//! ```ignore
//! use swe_crew::scaffold::{AgentTeam, FixRunner, TeamConfig};
//! use swe_crew::llm::LiteLlmClient;
//! use swe_crew::swe::GitCli;
//!
//! let llm = Arc::new(LiteLlmClient::from_env(Duration::from_secs(120))?);
//! let team = AgentTeam::new(llm, Arc::new(GitCli::new(None)), TeamConfig::default());
//! let outcome = team.run(&task, &repo_dir).await?;
//! ```

pub mod agent_loop;
pub mod prompts;
pub mod team;
pub mod tools;

pub use agent_loop::{
    AgentConfig, AgentError, AgentLoop, AgentResult, JsonToolCallParser, StepResult, StopReason,
    ToolCall, ToolCallParser, TurnBudget,
};
pub use team::{AgentTeam, DelegateTool, FixRunner, Role, TeamConfig, TeamMode, TeamOutcome};
pub use tools::{
    ExecutionContext, FindFileTool, GitAddTool, ReadFileTool, RunCommandTool, Tool, ToolError,
    ToolRegistry, ToolResult, WriteFileTool,
};
