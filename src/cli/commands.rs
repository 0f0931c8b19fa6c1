//! CLI command definitions for swe-crew.
//!
//! Every flag can also be set through an environment variable, and through
//! the YAML file given with `--config`. Explicit flags win over the file,
//! the file wins over the built-in defaults.

use crate::llm::{LiteLlmClient, LlmProvider, DEFAULT_MODEL};
use crate::pipeline::{Pipeline, PipelineConfig, RunContext, RunSummary};
use crate::scaffold::TeamMode;
use crate::swe::{IndexClient, ResultLog, TaskRecord, TaskSource};
use clap::{Args, Parser};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Multi-agent SWE-bench runner.
#[derive(Parser)]
#[command(name = "swe-crew")]
#[command(about = "Run a planner/coder/tester agent team against SWE-bench tasks")]
#[command(version)]
#[command(
    long_about = "swe-crew fetches benchmark tasks from an index service, clones each repository at the task's commit, lets a team of LLM agents attempt a fix and submits the result to a test harness.\n\nExample usage:\n  swe-crew run --start 1 --end 300 --api-base http://localhost:4000/v1"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML file with pipeline settings.
    #[arg(short, long, global = true, env = "SWE_CREW_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full pipeline over an inclusive range of task indices.
    Run(RunArgs),

    /// Fetch one task descriptor and show how its repository would be cloned.
    Fetch(FetchArgs),

    /// Submit an already prepared repository to the harness and log the result.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),
}

/// Arguments for `swe-crew run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// First task index.
    #[arg(short, long, default_value = "1")]
    pub start: u32,

    /// Last task index (inclusive).
    #[arg(short, long, default_value = "300")]
    pub end: u32,

    #[command(flatten)]
    pub services: ServiceArgs,

    #[command(flatten)]
    pub paths: PathArgs,

    #[command(flatten)]
    pub team: TeamArgs,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Arguments for `swe-crew fetch`.
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Task index to fetch.
    pub index: u32,

    /// Output JSON to stdout instead of a readable summary.
    #[arg(short = 'j', long)]
    pub json: bool,

    #[command(flatten)]
    pub services: ServiceArgs,
}

/// Arguments for `swe-crew evaluate`.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Task index whose repository is evaluated.
    pub index: u32,

    /// Instance id to submit instead of the one in the descriptor.
    #[arg(long)]
    pub instance_id: Option<String>,

    #[command(flatten)]
    pub services: ServiceArgs,

    #[command(flatten)]
    pub paths: PathArgs,
}

/// Endpoints of the two REST services.
#[derive(Args, Debug, Default)]
pub struct ServiceArgs {
    /// Base URL of the task index service.
    #[arg(long, env = "SWE_CREW_INDEX_URL")]
    pub index_url: Option<String>,

    /// Base URL of the test harness service.
    #[arg(long, env = "SWE_CREW_HARNESS_URL")]
    pub harness_url: Option<String>,

    /// Timeout in seconds for index and harness requests (unset waits forever).
    #[arg(long, env = "SWE_CREW_HTTP_TIMEOUT")]
    pub http_timeout: Option<u64>,
}

/// Local and harness-side file locations.
#[derive(Args, Debug, Default)]
pub struct PathArgs {
    /// Directory the task repositories are cloned into.
    #[arg(long, env = "SWE_CREW_REPOS_DIR")]
    pub repos_dir: Option<PathBuf>,

    /// Root under which the harness sees the cloned repositories.
    #[arg(long, env = "SWE_CREW_HARNESS_REPO_ROOT")]
    pub harness_repo_root: Option<String>,

    /// Human-readable result log (appended to).
    #[arg(long, env = "SWE_CREW_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Optional JSONL report with one record per task.
    #[arg(long, env = "SWE_CREW_REPORT")]
    pub report: Option<PathBuf>,
}

/// Agent team settings.
#[derive(Args, Debug, Default)]
pub struct TeamArgs {
    /// Orchestration mode (handoff or crew).
    #[arg(long, env = "SWE_CREW_MODE")]
    pub mode: Option<TeamMode>,

    /// LLM turns shared by the whole team per task.
    #[arg(long, env = "SWE_CREW_MAX_TURNS")]
    pub max_turns: Option<usize>,

    /// Model for the planner (defaults to the client's model).
    #[arg(long, env = "SWE_CREW_PLANNER_MODEL")]
    pub planner_model: Option<String>,

    /// Model for the coder and tester (defaults to the client's model).
    #[arg(long, env = "SWE_CREW_WORKER_MODEL")]
    pub worker_model: Option<String>,

    /// Sampling temperature.
    #[arg(long, env = "SWE_CREW_TEMPERATURE")]
    pub temperature: Option<f64>,

    /// Maximum tokens per completion.
    #[arg(long, env = "SWE_CREW_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    /// Timeout in seconds for git clone/checkout/add (unset waits forever).
    #[arg(long, env = "SWE_CREW_GIT_TIMEOUT")]
    pub git_timeout: Option<u64>,

    /// Upper bound in seconds for one tester command.
    #[arg(long, env = "SWE_CREW_COMMAND_TIMEOUT")]
    pub command_timeout: Option<u64>,

    /// Timeout in seconds for one LLM request.
    #[arg(long, env = "SWE_CREW_LLM_TIMEOUT")]
    pub llm_timeout: Option<u64>,
}

/// Credentials for the OpenAI-compatible LLM endpoint.
#[derive(Args, Debug, Default)]
pub struct LlmArgs {
    /// Base URL of the LiteLLM / OpenAI-compatible API.
    #[arg(long, env = "LITELLM_API_BASE")]
    pub api_base: Option<String>,

    /// API key for the LLM endpoint.
    #[arg(long, env = "LITELLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Default model for every agent.
    #[arg(short = 'm', long, env = "LITELLM_DEFAULT_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,
}

impl ServiceArgs {
    fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(url) = &self.index_url {
            config = config.with_index_url(url);
        }
        if let Some(url) = &self.harness_url {
            config = config.with_harness_url(url);
        }
        if let Some(secs) = self.http_timeout {
            config = config.with_http_timeout_secs(secs);
        }
        config
    }
}

impl PathArgs {
    fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(dir) = &self.repos_dir {
            config = config.with_repos_dir(dir);
        }
        if let Some(root) = &self.harness_repo_root {
            config = config.with_harness_repo_root(root);
        }
        if let Some(path) = &self.log_file {
            config = config.with_log_file(path);
        }
        if let Some(path) = &self.report {
            config = config.with_report_file(path);
        }
        config
    }
}

impl TeamArgs {
    fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(mode) = self.mode {
            config = config.with_team_mode(mode);
        }
        if let Some(max) = self.max_turns {
            config = config.with_max_turns(max);
        }
        if let Some(model) = &self.planner_model {
            config = config.with_planner_model(model);
        }
        if let Some(model) = &self.worker_model {
            config = config.with_worker_model(model);
        }
        if let Some(temp) = self.temperature {
            config = config.with_temperature(temp);
        }
        if let Some(max) = self.max_tokens {
            config = config.with_max_tokens(max);
        }
        if let Some(secs) = self.git_timeout {
            config = config.with_git_timeout_secs(secs);
        }
        if let Some(secs) = self.command_timeout {
            config = config.with_command_timeout_secs(secs);
        }
        if let Some(secs) = self.llm_timeout {
            config = config.with_llm_timeout_secs(secs);
        }
        config
    }
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let base = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Run(args) => run_pipeline_command(base, args).await,
        Commands::Fetch(args) => run_fetch_command(base, args).await,
        Commands::Evaluate(args) => run_evaluate_command(base, args).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration file");
            Ok(PipelineConfig::from_yaml_file(path)?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn check_range(start: u32, end: u32) -> anyhow::Result<()> {
    if start > end {
        anyhow::bail!("--start ({start}) must not be greater than --end ({end})");
    }
    Ok(())
}

fn build_llm_client(args: &LlmArgs, timeout: Duration) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let api_base = args.api_base.clone().ok_or_else(|| {
        anyhow::anyhow!("No LLM endpoint configured. Please provide --api-base or set LITELLM_API_BASE.")
    })?;
    info!(api_base = %api_base, model = %args.model, "Using LiteLLM client");
    let client = LiteLlmClient::with_timeout(
        api_base,
        args.api_key.clone(),
        args.model.clone(),
        timeout,
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialize LLM client: {}", e))?;
    Ok(Arc::new(client))
}

fn open_log(config: &PipelineConfig) -> ResultLog {
    let log = ResultLog::new(&config.log_file);
    match &config.report_file {
        Some(report) => log.with_report(report),
        None => log,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_pipeline_command(base: PipelineConfig, args: RunArgs) -> anyhow::Result<()> {
    check_range(args.start, args.end)?;
    let config = args
        .team
        .apply(args.paths.apply(args.services.apply(base)));
    config.validate()?;

    let llm = build_llm_client(&args.llm, config.llm_timeout())?;
    let pipeline = Pipeline::from_config(&config)?.with_agent_team(&config, llm);
    let ctx = RunContext::new(open_log(&config))?;

    println!("\n🤖 SWE Crew");
    println!("===========");
    println!("Run: {}", ctx.run_id());
    println!("Tasks: {}..={}", args.start, args.end);
    println!("Mode: {}", config.team_mode);
    println!("Turn budget per task: {}", config.max_turns);
    println!("Log: {}", config.log_file.display());
    println!();

    let summary = pipeline.run_range(args.start..=args.end, &ctx).await;
    print_summary(&summary);
    Ok(())
}

async fn run_fetch_command(base: PipelineConfig, args: FetchArgs) -> anyhow::Result<()> {
    let config = args.services.apply(base);
    config.validate()?;
    let client = IndexClient::new(&config.index_url, config.http_timeout())?;
    let task = client.fetch(args.index).await?;
    let clone_spec = task.clone_spec();

    if args.json {
        let output = serde_json::json!({
            "task": task,
            "clone": clone_spec.as_ref().ok(),
            "clone_error": clone_spec.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("\n📋 Task {}", task.index);
    println!("==========");
    println!("Instance: {}", task.instance_id);
    match &clone_spec {
        Ok(spec) => {
            println!("Repository: {}", spec.url);
            println!("Commit: {}", spec.commit.as_deref().unwrap_or("(default branch)"));
        }
        Err(e) => println!("⚠ Clone command not usable: {}", e),
    }
    println!("FAIL_TO_PASS: {}", task.fail_to_pass.len());
    for test in &task.fail_to_pass {
        println!("   {}", test);
    }
    println!("PASS_TO_PASS: {}", task.pass_to_pass.len());
    println!();
    println!("{}", task.problem_statement);
    Ok(())
}

async fn run_evaluate_command(base: PipelineConfig, args: EvaluateArgs) -> anyhow::Result<()> {
    let config = args.paths.apply(args.services.apply(base));
    config.validate()?;

    let pipeline = Pipeline::from_config(&config)?;
    let ctx = RunContext::new(open_log(&config))?;
    let record = pipeline
        .evaluate_task(args.index, args.instance_id, &ctx)
        .await;
    print_record(&record);
    Ok(())
}

fn print_record(record: &TaskRecord) {
    let status_icon = match record.status {
        crate::swe::TaskStatus::Resolved => "✓",
        _ => "✗",
    };
    println!(
        "{} Task {} [{}]: {}",
        status_icon,
        record.index,
        record.instance_id.as_deref().unwrap_or("unknown"),
        record.status
    );
    if let (Some(f2p), Some(p2p)) = (&record.fail_to_pass, &record.pass_to_pass) {
        println!("   FAIL_TO_PASS: {}", f2p);
        println!("   PASS_TO_PASS: {}", p2p);
    }
    if let Some(ref err) = record.error {
        println!("   ⚠ {}", err);
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Summary");
    println!("==========");
    println!("Attempted: {}", summary.attempted);
    println!("Resolved: {}", summary.resolved);
    println!("Unresolved: {}", summary.unresolved);
    println!("Errors: {}", summary.errors);
    if summary.attempted > 0 {
        println!(
            "Resolve rate: {:.1}%",
            summary.resolved as f64 / summary.attempted as f64 * 100.0
        );
    }
}
