//! Pipeline configuration.
//!
//! Service endpoints, filesystem locations, agent team settings and the
//! timeout policy. Values come from `Default`, an optional YAML file, and CLI
//! flags (which win), in that order.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::scaffold::{TeamConfig, TeamMode};
use crate::swe::{DEFAULT_HARNESS_URL, DEFAULT_INDEX_URL};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value has the wrong shape.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The YAML config file could not be parsed.
    #[error("Invalid config file '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    // Services
    /// Base URL of the task index service.
    pub index_url: String,
    /// Base URL of the test harness service.
    pub harness_url: String,

    // Filesystem
    /// Local directory holding the `repo_<index>` clones.
    pub repos_dir: PathBuf,
    /// Where the harness sees `repos_dir` (e.g. a container mount).
    pub harness_repo_root: String,
    /// Append-only human-readable result log.
    pub log_file: PathBuf,
    /// Optional JSONL report, one record per task.
    pub report_file: Option<PathBuf>,

    // Agent team
    pub team_mode: TeamMode,
    /// Turn budget shared by the team for one task.
    pub max_turns: usize,
    /// Model for the planner; empty means the LLM client's default.
    pub planner_model: String,
    /// Model for coder and tester; empty means the LLM client's default.
    pub worker_model: String,
    pub temperature: f64,
    pub max_tokens: u32,

    // Timeouts (unset means wait indefinitely)
    pub http_timeout_secs: Option<u64>,
    pub git_timeout_secs: Option<u64>,
    pub command_timeout_secs: u64,
    pub llm_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            harness_url: DEFAULT_HARNESS_URL.to_string(),

            repos_dir: PathBuf::from("repos"),
            harness_repo_root: "/repos".to_string(),
            log_file: PathBuf::from("results.log"),
            report_file: None,

            team_mode: TeamMode::Handoff,
            max_turns: 50,
            planner_model: String::new(),
            worker_model: String::new(),
            temperature: 0.7,
            max_tokens: 4096,

            http_timeout_secs: None,
            git_timeout_secs: None,
            command_timeout_secs: 300,
            llm_timeout_secs: 120,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a YAML config file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, url) in [("index_url", &self.index_url), ("harness_url", &self.harness_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("'{}' is not an http(s) URL", url),
                });
            }
        }

        if self.harness_repo_root.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "harness_repo_root cannot be empty".to_string(),
            ));
        }

        if self.max_turns == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_turns must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        let timeouts = [
            ("http_timeout_secs", self.http_timeout_secs),
            ("git_timeout_secs", self.git_timeout_secs),
            ("command_timeout_secs", Some(self.command_timeout_secs)),
            ("llm_timeout_secs", Some(self.llm_timeout_secs)),
        ];
        for (key, value) in timeouts {
            if value == Some(0) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    key
                )));
            }
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    pub fn git_timeout(&self) -> Option<Duration> {
        self.git_timeout_secs.map(Duration::from_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    /// Team settings derived from this configuration.
    pub fn team_config(&self) -> TeamConfig {
        TeamConfig {
            mode: self.team_mode,
            max_turns: self.max_turns,
            planner_model: self.planner_model.clone(),
            worker_model: self.worker_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            command_timeout: self.command_timeout(),
        }
    }

    /// Builder method to set the index service URL.
    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = url.into();
        self
    }

    /// Builder method to set the harness service URL.
    pub fn with_harness_url(mut self, url: impl Into<String>) -> Self {
        self.harness_url = url.into();
        self
    }

    /// Builder method to set the local repos directory.
    pub fn with_repos_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.repos_dir = dir.into();
        self
    }

    /// Builder method to set the harness-side repos root.
    pub fn with_harness_repo_root(mut self, root: impl Into<String>) -> Self {
        self.harness_repo_root = root.into();
        self
    }

    /// Builder method to set the result log path.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = path.into();
        self
    }

    /// Builder method to set the JSONL report path.
    pub fn with_report_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_file = Some(path.into());
        self
    }

    /// Builder method to set the team mode.
    pub fn with_team_mode(mut self, mode: TeamMode) -> Self {
        self.team_mode = mode;
        self
    }

    /// Builder method to set the turn budget.
    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    /// Builder method to set the planner model.
    pub fn with_planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = model.into();
        self
    }

    /// Builder method to set the coder/tester model.
    pub fn with_worker_model(mut self, model: impl Into<String>) -> Self {
        self.worker_model = model.into();
        self
    }

    /// Builder method to set temperature.
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    /// Builder method to set the completion token limit.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// Builder method to set the HTTP timeout for the index and harness services.
    pub fn with_http_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout_secs = Some(secs);
        self
    }

    /// Builder method to set the git subprocess timeout.
    pub fn with_git_timeout_secs(mut self, secs: u64) -> Self {
        self.git_timeout_secs = Some(secs);
        self
    }

    /// Builder method to set the tester command timeout.
    pub fn with_command_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    /// Builder method to set the LLM request timeout.
    pub fn with_llm_timeout_secs(mut self, secs: u64) -> Self {
        self.llm_timeout_secs = secs;
        self
    }
}
