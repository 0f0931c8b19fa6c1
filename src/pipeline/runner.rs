//! Per-task pipeline: fetch → prepare repo → run agents → evaluate → log.
//!
//! Tasks run strictly one after another. Every failure inside a task is caught
//! by [`Pipeline::run_task`], which appends exactly one block to the result
//! log whatever happens.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::config::PipelineConfig;
use super::context::RunContext;
use crate::error::{EvalError, PipelineError, RepoError};
use crate::llm::LlmProvider;
use crate::scaffold::{AgentError, AgentTeam, FixRunner};
use crate::swe::{
    repo_dir_name, EvaluationRequest, EvaluationResult, Evaluator, GitCli, HarnessClient,
    IndexClient, RepoPreparer, TaskDescriptor, TaskRecord, TaskSource, TaskStatus,
};

/// Counts over a range of tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub errors: usize,
}

impl RunSummary {
    fn add(&mut self, status: TaskStatus) {
        self.attempted += 1;
        match status {
            TaskStatus::Resolved => self.resolved += 1,
            TaskStatus::Unresolved => self.unresolved += 1,
            TaskStatus::Error => self.errors += 1,
        }
    }
}

/// Facts collected while a task progresses, kept even if a later stage fails.
#[derive(Debug, Default)]
struct TaskProgress {
    instance_id: Option<String>,
    agent_turns: Option<usize>,
}

/// The sequential task pipeline.
///
/// Without a fix runner only [`Pipeline::evaluate_task`] is useful; a full
/// [`Pipeline::run_task`] then logs a configuration error.
pub struct Pipeline {
    source: Arc<dyn TaskSource>,
    preparer: RepoPreparer,
    evaluator: Arc<dyn Evaluator>,
    fixer: Option<Arc<dyn FixRunner>>,
    harness_repo_root: String,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn TaskSource>,
        preparer: RepoPreparer,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            source,
            preparer,
            evaluator,
            fixer: None,
            harness_repo_root: "/repos".to_string(),
        }
    }

    /// Set what attempts the fix between clone and evaluation.
    pub fn with_fixer(mut self, fixer: Arc<dyn FixRunner>) -> Self {
        self.fixer = Some(fixer);
        self
    }

    /// Use the LLM agent team configured in `config` as the fix runner.
    pub fn with_agent_team(self, config: &PipelineConfig, llm: Arc<dyn LlmProvider>) -> Self {
        let vcs = Arc::new(GitCli::new(config.git_timeout()));
        self.with_fixer(Arc::new(AgentTeam::new(llm, vcs, config.team_config())))
    }

    /// Set where the harness sees the repos directory.
    pub fn with_harness_repo_root(mut self, root: impl Into<String>) -> Self {
        self.harness_repo_root = root.into();
        self
    }

    /// Wire the index, git and harness clients from a configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let vcs = Arc::new(GitCli::new(config.git_timeout()));
        let source = Arc::new(IndexClient::new(&config.index_url, config.http_timeout())?);
        let evaluator = Arc::new(HarnessClient::new(&config.harness_url, config.http_timeout())?);
        let preparer = RepoPreparer::new(&config.repos_dir, vcs);

        Ok(Self::new(source, preparer, evaluator)
            .with_harness_repo_root(&config.harness_repo_root))
    }

    /// Repository path as the harness sees it.
    pub fn harness_repo_dir(&self, index: u32) -> String {
        format!(
            "{}/{}",
            self.harness_repo_root.trim_end_matches('/'),
            repo_dir_name(index)
        )
    }

    /// Run every index in `range`, in order, one at a time.
    pub async fn run_range(&self, range: RangeInclusive<u32>, ctx: &RunContext) -> RunSummary {
        let mut summary = RunSummary::default();
        for index in range {
            let record = self.run_task(index, ctx).await;
            summary.add(record.status);
        }
        info!(
            run_id = %ctx.run_id(),
            attempted = summary.attempted,
            resolved = summary.resolved,
            unresolved = summary.unresolved,
            errors = summary.errors,
            "Run finished"
        );
        summary
    }

    /// Run the full pipeline for one task and log its outcome.
    ///
    /// Never fails: any stage error becomes an error block in the log.
    pub async fn run_task(&self, index: u32, ctx: &RunContext) -> TaskRecord {
        let guard = ctx.workdir_guard();
        let started_at = Utc::now();
        let mut progress = TaskProgress::default();

        let outcome = self.try_run_task(index, &mut progress).await;
        // Relative log paths resolve against the original directory.
        drop(guard);
        self.finish(index, ctx, progress, started_at, outcome)
    }

    /// Evaluate an already prepared repository (no clone, no agents) and log
    /// the outcome.
    pub async fn evaluate_task(
        &self,
        index: u32,
        instance_id: Option<String>,
        ctx: &RunContext,
    ) -> TaskRecord {
        let guard = ctx.workdir_guard();
        let started_at = Utc::now();
        let mut progress = TaskProgress::default();

        let outcome = self
            .try_evaluate_task(index, instance_id, &mut progress)
            .await;
        drop(guard);
        self.finish(index, ctx, progress, started_at, outcome)
    }

    async fn try_evaluate_task(
        &self,
        index: u32,
        instance_id: Option<String>,
        progress: &mut TaskProgress,
    ) -> Result<EvaluationResult, PipelineError> {
        let mut task = self.source.fetch(index).await?;
        if let Some(id) = instance_id {
            task.instance_id = id;
        }
        progress.instance_id = Some(task.instance_id.clone());
        Ok(self.evaluate(&task).await?)
    }

    async fn try_run_task(
        &self,
        index: u32,
        progress: &mut TaskProgress,
    ) -> Result<EvaluationResult, PipelineError> {
        let fixer = self
            .fixer
            .as_ref()
            .ok_or_else(|| AgentError::ConfigError("no agent team configured".to_string()))?;

        let task = self.source.fetch(index).await?;
        progress.instance_id = Some(task.instance_id.clone());

        let spec = task.clone_spec()?;
        let repo = self.preparer.prepare(index, &spec).await?;
        let repo = tokio::fs::canonicalize(&repo).await.map_err(RepoError::Io)?;

        info!(index, instance_id = %task.instance_id, "Running agents");
        let outcome = fixer.run(&task, &repo).await?;
        progress.agent_turns = Some(outcome.turns_used);
        if outcome.budget_exhausted() {
            warn!(index, turns = outcome.turns_used, "Turn budget exhausted, evaluating partial fix");
        }

        Ok(self.evaluate(&task).await?)
    }

    /// Submit a task's repository to the harness.
    pub async fn evaluate(&self, task: &TaskDescriptor) -> Result<EvaluationResult, EvalError> {
        let request = EvaluationRequest {
            instance_id: task.instance_id.clone(),
            repo_dir: self.harness_repo_dir(task.index),
            fail_to_pass: task.fail_to_pass.clone(),
            pass_to_pass: task.pass_to_pass.clone(),
        };
        self.evaluator.evaluate(&request).await
    }

    /// Append the log block and the JSONL record for a finished task.
    fn finish(
        &self,
        index: u32,
        ctx: &RunContext,
        progress: TaskProgress,
        started_at: chrono::DateTime<Utc>,
        outcome: Result<EvaluationResult, PipelineError>,
    ) -> TaskRecord {
        let mut record = TaskRecord {
            run_id: ctx.run_id(),
            index,
            instance_id: progress.instance_id,
            status: TaskStatus::Error,
            fail_to_pass: None,
            pass_to_pass: None,
            agent_turns: progress.agent_turns,
            error: None,
            started_at,
            finished_at: Utc::now(),
        };

        let logged = match &outcome {
            Ok(result) => {
                record.status = if result.is_resolved() {
                    TaskStatus::Resolved
                } else {
                    TaskStatus::Unresolved
                };
                record.fail_to_pass = Some(result.fail_to_pass.ratio());
                record.pass_to_pass = Some(result.pass_to_pass.ratio());
                info!(
                    index,
                    instance_id = %result.instance_id,
                    fail_to_pass = %result.fail_to_pass.ratio(),
                    pass_to_pass = %result.pass_to_pass.ratio(),
                    "Test case evaluated"
                );
                ctx.log().log_result(index, result)
            }
            Err(e) => {
                let message = e.to_string();
                error!(index, error = %message, "Test case failed");
                record.error = Some(message.clone());
                ctx.log().log_error(index, &message)
            }
        };

        if let Err(e) = logged {
            error!(index, error = %e, "Failed to append to result log");
        }
        if let Err(e) = ctx.log().record(&record) {
            error!(index, error = %e, "Failed to append to report");
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::tests::CWD_LOCK;
    use crate::pipeline::context::WorkdirGuard;
    use crate::scaffold::{TeamMode, TeamOutcome};
    use crate::swe::repo::tests::RecordingVcs;
    use crate::swe::ResultLog;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Fix runner that records the repositories it was pointed at.
    #[derive(Default)]
    struct FakeFixer {
        repos: Mutex<Vec<PathBuf>>,
        chdir_into_repo: bool,
        fail: bool,
    }

    #[async_trait]
    impl FixRunner for FakeFixer {
        async fn run(
            &self,
            _task: &TaskDescriptor,
            repo_dir: &Path,
        ) -> Result<TeamOutcome, AgentError> {
            self.repos.lock().unwrap().push(repo_dir.to_path_buf());
            if self.chdir_into_repo {
                std::env::set_current_dir(repo_dir).unwrap();
            }
            if self.fail {
                return Err(AgentError::ParseError("Empty LLM response".to_string()));
            }
            Ok(TeamOutcome {
                mode: TeamMode::Handoff,
                turns_used: 7,
                turn_limit: 50,
                runs: vec![],
                summary: "done".to_string(),
            })
        }
    }

    fn descriptor_body(index: u32) -> serde_json::Value {
        serde_json::json!({
            "Problem_statement": format!("Bug number {index}"),
            "git_clone": "git clone https://github.com/o/r.git && git checkout abc123",
            "FAIL_TO_PASS": "[\"t1\", \"t2\", \"t3\", \"t4\"]",
            "PASS_TO_PASS": "[\"p1\"]",
            "instance_id": format!("o__r-{index}")
        })
    }

    fn harness_body(instance_id: &str) -> serde_json::Value {
        let output = serde_json::json!({
            instance_id: {
                "tests_status": {
                    "FAIL_TO_PASS": {"success": ["t1", "t2", "t3"], "failure": ["t4"]},
                    "PASS_TO_PASS": {"success": ["p1"], "failure": []}
                }
            }
        });
        serde_json::json!({"harnessOutput": output.to_string()})
    }

    async fn mount_task(server: &MockServer, index: u32) {
        Mock::given(method("GET"))
            .and(path(format!("/task/index/{index}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(descriptor_body(index)))
            .mount(server)
            .await;
    }

    async fn mount_harness(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    struct Fixture {
        tmp: tempfile::TempDir,
        repos_dir: PathBuf,
        log_path: PathBuf,
        report_path: PathBuf,
        vcs: Arc<RecordingVcs>,
        fixer: Arc<FakeFixer>,
    }

    impl Fixture {
        fn new(fixer: FakeFixer) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            Self {
                repos_dir: tmp.path().join("repos"),
                log_path: tmp.path().join("results.log"),
                report_path: tmp.path().join("report.jsonl"),
                tmp,
                vcs: Arc::new(RecordingVcs::default()),
                fixer: Arc::new(fixer),
            }
        }

        fn pipeline(&self, server: &MockServer) -> Pipeline {
            Pipeline::new(
                Arc::new(IndexClient::new(server.uri(), None).unwrap()),
                RepoPreparer::new(&self.repos_dir, self.vcs.clone()),
                Arc::new(HarnessClient::new(server.uri(), None).unwrap()),
            )
            .with_fixer(self.fixer.clone())
        }

        fn context(&self) -> RunContext {
            RunContext::new(ResultLog::new(&self.log_path).with_report(&self.report_path)).unwrap()
        }

        fn log(&self) -> String {
            std::fs::read_to_string(&self.log_path).unwrap_or_default()
        }
    }

    #[test]
    fn harness_repo_dir_uses_configured_root() {
        let pipeline = Pipeline::from_config(&PipelineConfig::default()).unwrap();
        assert_eq!(pipeline.harness_repo_dir(3), "/repos/repo_3");
        let pipeline = pipeline.with_harness_repo_root("/mnt/r/");
        assert_eq!(pipeline.harness_repo_dir(3), "/mnt/r/repo_3");
    }

    #[tokio::test]
    async fn successful_task_logs_pass_counts() {
        let _lock = CWD_LOCK.lock().await;
        let server = MockServer::start().await;
        mount_task(&server, 1).await;
        mount_harness(&server, harness_body("o__r-1")).await;
        let fixture = Fixture::new(FakeFixer::default());

        let record = fixture.pipeline(&server).run_task(1, &fixture.context()).await;

        assert_eq!(record.status, TaskStatus::Unresolved);
        assert_eq!(record.agent_turns, Some(7));
        assert_eq!(
            fixture.log(),
            "\n--- TESTCASE 1 ---\nFAIL_TO_PASS passed: 3/4\nPASS_TO_PASS passed: 1/1\n"
        );
        assert_eq!(
            *fixture.vcs.calls.lock().unwrap(),
            vec!["clone https://github.com/o/r.git", "checkout abc123"]
        );
        let repos = fixture.fixer.repos.lock().unwrap();
        assert!(repos[0].is_absolute());
        assert!(repos[0].ends_with("repo_1"));

        let requests = server.received_requests().await.unwrap();
        let post = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&post.body).unwrap();
        assert_eq!(payload["repoDir"], "/repos/repo_1");
        assert_eq!(payload["FAIL_TO_PASS"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn index_error_logs_error_block_without_counts() {
        let _lock = CWD_LOCK.lock().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/index/5"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let fixture = Fixture::new(FakeFixer::default());

        let record = fixture.pipeline(&server).run_task(5, &fixture.context()).await;

        assert_eq!(record.status, TaskStatus::Error);
        let log = fixture.log();
        assert_eq!(log, "\n--- TESTCASE 5 ---\nError: Invalid response: 404\n");
        assert!(!log.contains("passed:"));
        assert!(fixture.vcs.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_harness_output_logs_error_block() {
        let _lock = CWD_LOCK.lock().await;
        let server = MockServer::start().await;
        mount_task(&server, 2).await;
        mount_harness(&server, serde_json::json!({"harnessOutput": ""})).await;
        let fixture = Fixture::new(FakeFixer::default());

        let record = fixture.pipeline(&server).run_task(2, &fixture.context()).await;

        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(record.instance_id.as_deref(), Some("o__r-2"));
        let log = fixture.log();
        assert!(log.starts_with("\n--- TESTCASE 2 ---\nError: Invalid harness data"));
        assert!(!log.contains("passed:"));
    }

    #[tokio::test]
    async fn one_block_per_task_and_cwd_restored() {
        let _lock = CWD_LOCK.lock().await;
        let before = std::env::current_dir().unwrap();
        let server = MockServer::start().await;
        mount_task(&server, 1).await;
        mount_task(&server, 3).await;
        mount_harness(&server, harness_body("o__r-1")).await;
        let fixture = Fixture::new(FakeFixer {
            chdir_into_repo: true,
            ..FakeFixer::default()
        });
        let ctx = fixture.context();

        let summary = fixture.pipeline(&server).run_range(1..=3, &ctx).await;

        assert_eq!(std::env::current_dir().unwrap(), before);
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.errors, 1);
        let log = fixture.log();
        assert_eq!(log.matches("--- TESTCASE").count(), 3);
        assert!(log.contains("--- TESTCASE 2 ---\nError: Invalid response: 404"));

        let report = std::fs::read_to_string(&fixture.report_path).unwrap();
        let records: Vec<TaskRecord> = report
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.run_id == ctx.run_id()));
        assert_eq!(records[1].index, 2);
    }

    #[tokio::test]
    async fn agent_failure_is_logged_and_cwd_restored() {
        let _lock = CWD_LOCK.lock().await;
        let before = std::env::current_dir().unwrap();
        let server = MockServer::start().await;
        mount_task(&server, 4).await;
        let fixture = Fixture::new(FakeFixer {
            chdir_into_repo: true,
            fail: true,
            ..FakeFixer::default()
        });

        let record = fixture.pipeline(&server).run_task(4, &fixture.context()).await;

        assert_eq!(std::env::current_dir().unwrap(), before);
        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(
            fixture.log(),
            "\n--- TESTCASE 4 ---\nError: Agent run failed: Parse error: Empty LLM response\n"
        );
    }

    #[tokio::test]
    async fn checkout_failure_is_logged() {
        let _lock = CWD_LOCK.lock().await;
        let server = MockServer::start().await;
        mount_task(&server, 6).await;
        let mut fixture = Fixture::new(FakeFixer::default());
        fixture.vcs = Arc::new(RecordingVcs {
            fail_checkout: true,
            ..RecordingVcs::default()
        });

        let record = fixture.pipeline(&server).run_task(6, &fixture.context()).await;

        assert_eq!(record.status, TaskStatus::Error);
        assert!(fixture.log().contains("git checkout abc123"));
        assert!(fixture.fixer.repos.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn evaluate_task_skips_clone_and_agents() {
        let _lock = CWD_LOCK.lock().await;
        let server = MockServer::start().await;
        mount_task(&server, 1).await;
        mount_harness(&server, harness_body("custom-id")).await;
        let fixture = Fixture::new(FakeFixer::default());

        let record = fixture
            .pipeline(&server)
            .evaluate_task(1, Some("custom-id".to_string()), &fixture.context())
            .await;

        assert_eq!(record.instance_id.as_deref(), Some("custom-id"));
        assert_eq!(record.fail_to_pass.as_deref(), Some("3/4"));
        assert!(fixture.vcs.calls.lock().unwrap().is_empty());
        assert!(fixture.fixer.repos.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_without_agent_team_logs_config_error() {
        let _lock = CWD_LOCK.lock().await;
        let server = MockServer::start().await;
        mount_task(&server, 2).await;
        let fixture = Fixture::new(FakeFixer::default());
        let pipeline = Pipeline::new(
            Arc::new(IndexClient::new(server.uri(), None).unwrap()),
            RepoPreparer::new(&fixture.repos_dir, fixture.vcs.clone()),
            Arc::new(HarnessClient::new(server.uri(), None).unwrap()),
        );

        let record = pipeline.run_task(2, &fixture.context()).await;

        assert_eq!(record.status, TaskStatus::Error);
        assert!(fixture.log().contains("no agent team configured"));
        assert!(fixture.vcs.calls.lock().unwrap().is_empty());
        assert!(!fixture.repos_dir.exists());
        let requests = server.received_requests().await.unwrap();
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn relative_log_lands_in_original_dir_after_fixer_chdir() {
        let _lock = CWD_LOCK.lock().await;
        let server = MockServer::start().await;
        mount_task(&server, 1).await;
        mount_task(&server, 3).await;
        mount_harness(&server, harness_body("o__r-1")).await;
        let fixture = Fixture::new(FakeFixer {
            chdir_into_repo: true,
            ..FakeFixer::default()
        });
        let _restore = WorkdirGuard::capture().unwrap();
        let base = fixture.tmp.path().to_path_buf();
        std::env::set_current_dir(&base).unwrap();
        let ctx = RunContext::new(ResultLog::new("results.log")).unwrap();

        let pipeline = fixture.pipeline(&server);
        pipeline.run_task(1, &ctx).await;
        pipeline.evaluate_task(3, None, &ctx).await;

        let log = std::fs::read_to_string(base.join("results.log")).unwrap();
        assert_eq!(log.matches("--- TESTCASE").count(), 2);
        assert!(log.contains("--- TESTCASE 1 ---\nFAIL_TO_PASS passed: 3/4"));
        assert!(!fixture.repos_dir.join("repo_1/results.log").exists());
    }
}
