//! The planner / coder / tester team that works on one task.
//!
//! Two orchestration modes share one [`TurnBudget`] per task:
//! - [`TeamMode::Handoff`]: the planner drives and delegates to the coder and
//!   tester, whose runs are nested inside the planner's `delegate` tool call.
//! - [`TeamMode::Crew`]: a fixed sequence plan → implement → review → stage,
//!   each step receiving the previous outputs as context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use super::agent_loop::{AgentConfig, AgentError, AgentLoop, AgentResult, StopReason, TurnBudget};
use super::prompts::{
    handoff_task, implement_task, plan_task, review_task, stage_task, with_context,
    CODER_INSTRUCTIONS, PLANNER_INSTRUCTIONS, TESTER_INSTRUCTIONS,
};
use super::tools::{
    ExecutionContext, FindFileTool, GitAddTool, ReadFileTool, RunCommandTool, Tool, ToolError,
    ToolRegistry, ToolResult, WriteFileTool,
};
use crate::llm::LlmProvider;
use crate::swe::{TaskDescriptor, VersionControl};

/// Role of an agent in the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Planner,
    Coder,
    Tester,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Planner => "Planner",
            Role::Coder => "Coder",
            Role::Tester => "Tester",
        }
    }

    pub fn instructions(&self) -> &'static str {
        match self {
            Role::Planner => PLANNER_INSTRUCTIONS,
            Role::Coder => CODER_INSTRUCTIONS,
            Role::Tester => TESTER_INSTRUCTIONS,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name().to_lowercase())
    }
}

/// How the team is orchestrated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamMode {
    #[default]
    Handoff,
    Crew,
}

impl fmt::Display for TeamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamMode::Handoff => write!(f, "handoff"),
            TeamMode::Crew => write!(f, "crew"),
        }
    }
}

impl FromStr for TeamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "handoff" => Ok(TeamMode::Handoff),
            "crew" => Ok(TeamMode::Crew),
            other => Err(format!(
                "unknown team mode '{}' (expected 'handoff' or 'crew')",
                other
            )),
        }
    }
}

/// Configuration shared by every agent of the team.
#[derive(Debug, Clone)]
pub struct TeamConfig {
    pub mode: TeamMode,
    /// Turns (LLM completions) available to the whole team per task.
    pub max_turns: usize,
    /// Model for the planner; empty means the provider default.
    pub planner_model: String,
    /// Model for the coder and tester; empty means the provider default.
    pub worker_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Timeout for the tester's `run_command` tool.
    pub command_timeout: Duration,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            mode: TeamMode::Handoff,
            max_turns: 50,
            planner_model: String::new(),
            worker_model: String::new(),
            temperature: 0.7,
            max_tokens: 4096,
            command_timeout: Duration::from_secs(300),
        }
    }
}

/// What the team produced for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamOutcome {
    pub mode: TeamMode,
    pub turns_used: usize,
    pub turn_limit: usize,
    /// Every agent run in the order it finished (nested runs before their parent).
    pub runs: Vec<AgentResult>,
    /// Final answer of the last top-level agent.
    pub summary: String,
}

impl TeamOutcome {
    pub fn budget_exhausted(&self) -> bool {
        self.runs
            .iter()
            .any(|r| r.stop_reason == StopReason::TurnBudgetExhausted)
    }
}

/// Runs an attempt to fix a task inside a prepared repository.
#[async_trait]
pub trait FixRunner: Send + Sync {
    async fn run(&self, task: &TaskDescriptor, repo_dir: &Path) -> Result<TeamOutcome, AgentError>;
}

/// The LLM-backed planner / coder / tester team.
pub struct AgentTeam {
    llm: Arc<dyn LlmProvider>,
    vcs: Arc<dyn VersionControl>,
    config: TeamConfig,
}

impl AgentTeam {
    pub fn new(llm: Arc<dyn LlmProvider>, vcs: Arc<dyn VersionControl>, config: TeamConfig) -> Self {
        Self { llm, vcs, config }
    }

    /// Tool subset for a role.
    pub fn tools_for(&self, role: Role) -> ToolRegistry {
        let registry = ToolRegistry::new()
            .with(Arc::new(ReadFileTool::new()))
            .with(Arc::new(FindFileTool::new()));
        match role {
            Role::Planner => registry.with(Arc::new(GitAddTool::new(self.vcs.clone()))),
            Role::Coder => registry.with(Arc::new(WriteFileTool::new())),
            Role::Tester => registry
                .with(Arc::new(WriteFileTool::new()))
                .with(Arc::new(RunCommandTool::new())),
        }
    }

    fn agent_config(&self, role: Role) -> AgentConfig {
        let model = match role {
            Role::Planner => &self.config.planner_model,
            Role::Coder | Role::Tester => &self.config.worker_model,
        };
        AgentConfig::new()
            .with_max_steps(self.config.max_turns)
            .with_model(model.clone())
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
    }

    fn agent(&self, role: Role, tools: ToolRegistry) -> AgentLoop {
        AgentLoop::new(
            role.display_name(),
            role.instructions(),
            self.llm.clone(),
            self.agent_config(role),
            tools,
        )
    }

    async fn run_handoff(
        &self,
        issue: &str,
        ctx: &ExecutionContext,
        budget: Arc<TurnBudget>,
    ) -> Result<(Vec<AgentResult>, String), AgentError> {
        let delegate = Arc::new(DelegateTool::new(
            Arc::new(self.agent(Role::Coder, self.tools_for(Role::Coder))),
            Arc::new(self.agent(Role::Tester, self.tools_for(Role::Tester))),
            budget.clone(),
        ));
        let planner = self.agent(
            Role::Planner,
            self.tools_for(Role::Planner).with(delegate.clone()),
        );

        let result = planner
            .run(&handoff_task(&ctx.working_dir, issue), ctx, &budget)
            .await?;
        let summary = result.summary.clone();
        let mut runs = delegate.take_runs();
        runs.push(result);
        Ok((runs, summary))
    }

    async fn run_crew(
        &self,
        issue: &str,
        ctx: &ExecutionContext,
        budget: Arc<TurnBudget>,
    ) -> Result<(Vec<AgentResult>, String), AgentError> {
        let repo = ctx.working_dir.as_path();
        let steps = [
            (Role::Planner, plan_task(repo, issue)),
            (Role::Coder, implement_task(repo, issue)),
            (Role::Tester, review_task(repo, issue)),
            (Role::Planner, stage_task(repo)),
        ];

        let mut runs: Vec<AgentResult> = Vec::new();
        let mut outputs: Vec<String> = Vec::new();
        for (role, task) in steps {
            if budget.is_exhausted() {
                warn!(role = %role, "Turn budget exhausted, skipping remaining crew steps");
                break;
            }
            let agent = self.agent(role, self.tools_for(role));
            let result = agent.run(&with_context(&task, &outputs), ctx, &budget).await?;
            outputs.push(result.summary.clone());
            runs.push(result);
        }

        let summary = outputs.last().cloned().unwrap_or_default();
        Ok((runs, summary))
    }
}

#[async_trait]
impl FixRunner for AgentTeam {
    async fn run(&self, task: &TaskDescriptor, repo_dir: &Path) -> Result<TeamOutcome, AgentError> {
        let ctx = ExecutionContext::new(repo_dir).with_timeout(self.config.command_timeout);
        let budget = Arc::new(TurnBudget::new(self.config.max_turns));
        info!(
            index = task.index,
            mode = %self.config.mode,
            max_turns = self.config.max_turns,
            "Running agent team"
        );

        let (runs, summary) = match self.config.mode {
            TeamMode::Handoff => {
                self.run_handoff(&task.problem_statement, &ctx, budget.clone())
                    .await?
            }
            TeamMode::Crew => {
                self.run_crew(&task.problem_statement, &ctx, budget.clone())
                    .await?
            }
        };

        info!(index = task.index, turns_used = budget.used(), "Agent team finished");
        Ok(TeamOutcome {
            mode: self.config.mode,
            turns_used: budget.used(),
            turn_limit: budget.limit(),
            runs,
            summary,
        })
    }
}

/// Planner tool that hands a subtask to the coder or the tester.
///
/// The delegate runs to completion inside this call and its final answer is
/// returned to the planner as the tool output.
pub struct DelegateTool {
    coder: Arc<AgentLoop>,
    tester: Arc<AgentLoop>,
    budget: Arc<TurnBudget>,
    runs: Mutex<Vec<AgentResult>>,
}

impl DelegateTool {
    pub fn new(coder: Arc<AgentLoop>, tester: Arc<AgentLoop>, budget: Arc<TurnBudget>) -> Self {
        Self {
            coder,
            tester,
            budget,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Drain the results of the runs delegated so far.
    pub fn take_runs(&self) -> Vec<AgentResult> {
        match self.runs.lock() {
            Ok(mut runs) => std::mem::take(&mut *runs),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    fn record(&self, result: AgentResult) {
        match self.runs.lock() {
            Ok(mut runs) => runs.push(result),
            Err(poisoned) => poisoned.into_inner().push(result),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DelegateParams {
    agent: String,
    task: String,
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Hand a subtask to a team member. 'coder' writes the code changes, 'tester' checks them and can run tests. Returns the member's final report."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent": {
                    "type": "string",
                    "enum": ["coder", "tester"],
                    "description": "Team member to hand the subtask to"
                },
                "task": {
                    "type": "string",
                    "description": "Self-contained description of the subtask, including file paths"
                }
            },
            "required": ["agent", "task"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let params: DelegateParams = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;
        let agent = match params.agent.to_lowercase().as_str() {
            "coder" => &self.coder,
            "tester" => &self.tester,
            other => {
                return Err(ToolError::InvalidParameters(format!(
                    "unknown agent '{}' (expected 'coder' or 'tester')",
                    other
                )))
            }
        };

        info!(delegate = agent.name(), "Handing off subtask");
        let result = agent
            .run(&params.task, ctx, &self.budget)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{} failed: {}", agent.name(), e)))?;

        let reply = if result.success {
            ToolResult::success(format!("{} reports:\n{}", agent.name(), result.summary))
        } else {
            ToolResult::partial(
                format!("{} stopped early: {}", agent.name(), result.summary),
                format!("{:?}", result.stop_reason),
            )
        };
        self.record(result);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaffold::agent_loop::tests::ScriptedLlm;
    use crate::swe::repo::tests::RecordingVcs;

    fn task(statement: &str) -> TaskDescriptor {
        TaskDescriptor {
            index: 1,
            problem_statement: statement.to_string(),
            git_clone: "git clone https://x/y.git".to_string(),
            fail_to_pass: vec![],
            pass_to_pass: vec![],
            instance_id: "x__y-1".to_string(),
        }
    }

    fn team(llm: Arc<ScriptedLlm>, vcs: Arc<RecordingVcs>, config: TeamConfig) -> AgentTeam {
        AgentTeam::new(llm, vcs, config)
    }

    #[test]
    fn test_team_mode_parsing() {
        assert_eq!("handoff".parse::<TeamMode>().unwrap(), TeamMode::Handoff);
        assert_eq!("Crew".parse::<TeamMode>().unwrap(), TeamMode::Crew);
        assert!("swarm".parse::<TeamMode>().is_err());
        assert_eq!(TeamMode::default().to_string(), "handoff");
    }

    #[test]
    fn test_tool_subsets() {
        let t = team(
            Arc::new(ScriptedLlm::default()),
            Arc::new(RecordingVcs::default()),
            TeamConfig::default(),
        );
        assert_eq!(
            t.tools_for(Role::Planner).list_tools(),
            vec!["find_file", "git_add", "read_file"]
        );
        assert_eq!(
            t.tools_for(Role::Coder).list_tools(),
            vec!["find_file", "read_file", "write_file"]
        );
        assert_eq!(
            t.tools_for(Role::Tester).list_tools(),
            vec!["find_file", "read_file", "run_command", "write_file"]
        );
    }

    #[tokio::test]
    async fn test_handoff_runs_coder_nested_and_stages() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("calc.py"), "def add(a, b):\n    return a - b\n").unwrap();
        let llm = Arc::new(ScriptedLlm::new([
            // planner
            r#"{"tool": "delegate", "arguments": {"agent": "coder", "task": "fix add in calc.py"}}"#,
            // coder
            r#"{"tool": "write_file", "arguments": {"path": "calc.py", "content": "def add(a, b):\n    return a + b\n"}}"#,
            "Fixed the operator in calc.py.",
            // planner
            r#"{"tool": "git_add", "arguments": {"file_path": "calc.py"}}"#,
            "Done: calc.py fixed and staged.",
        ]));
        let vcs = Arc::new(RecordingVcs::default());
        let t = team(llm.clone(), vcs.clone(), TeamConfig::default());

        let outcome = t.run(&task("add subtracts"), tmp.path()).await.unwrap();

        assert_eq!(outcome.turns_used, 5);
        assert_eq!(outcome.summary, "Done: calc.py fixed and staged.");
        assert_eq!(outcome.runs.len(), 2);
        assert_eq!(outcome.runs[0].agent, "Coder");
        assert_eq!(outcome.runs[1].agent, "Planner");
        assert!(!outcome.budget_exhausted());
        assert_eq!(*vcs.calls.lock().unwrap(), vec!["add calc.py"]);
        assert!(std::fs::read_to_string(tmp.path().join("calc.py"))
            .unwrap()
            .contains("a + b"));
    }

    #[tokio::test]
    async fn test_budget_is_shared_with_delegates() {
        let tmp = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"tool": "delegate", "arguments": {"agent": "tester", "task": "check"}}"#,
            r#"{"tool": "read_file", "arguments": {"path": "missing.py"}}"#,
            r#"{"tool": "read_file", "arguments": {"path": "missing.py"}}"#,
        ]));
        let config = TeamConfig {
            max_turns: 3,
            ..TeamConfig::default()
        };
        let t = team(llm.clone(), Arc::new(RecordingVcs::default()), config);

        let outcome = t.run(&task("bug"), tmp.path()).await.unwrap();

        assert_eq!(llm.request_count(), 3);
        assert_eq!(outcome.turns_used, 3);
        assert!(outcome.budget_exhausted());
        assert_eq!(outcome.runs.len(), 2);
    }

    #[tokio::test]
    async fn test_crew_passes_previous_outputs_as_context() {
        let tmp = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new([
            "1. change calc.py",
            "implemented",
            "looks good",
            "nothing to stage",
        ]));
        let config = TeamConfig {
            mode: TeamMode::Crew,
            ..TeamConfig::default()
        };
        let t = team(llm.clone(), Arc::new(RecordingVcs::default()), config);

        let outcome = t.run(&task("bug"), tmp.path()).await.unwrap();

        assert_eq!(outcome.mode, TeamMode::Crew);
        assert_eq!(outcome.runs.len(), 4);
        assert_eq!(outcome.summary, "nothing to stage");
        let requests = llm.requests.lock().unwrap();
        let review_prompt = &requests[2].messages[1].content;
        assert!(review_prompt.contains("1. change calc.py"));
        assert!(review_prompt.contains("implemented"));
    }

    #[tokio::test]
    async fn test_crew_stops_when_budget_runs_out() {
        let tmp = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(["plan", "impl", "review", "stage"]));
        let config = TeamConfig {
            mode: TeamMode::Crew,
            max_turns: 2,
            ..TeamConfig::default()
        };
        let t = team(llm.clone(), Arc::new(RecordingVcs::default()), config);

        let outcome = t.run(&task("bug"), tmp.path()).await.unwrap();
        assert_eq!(outcome.runs.len(), 2);
        assert_eq!(llm.request_count(), 2);
    }
}
