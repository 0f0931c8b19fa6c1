//! Local repository preparation.
//!
//! Each task gets its own working tree at `<repos_dir>/repo_<index>`. Git is
//! driven as a subprocess with an explicit working directory and with
//! interactive credential prompts disabled, so a private or missing
//! repository fails fast instead of waiting for input.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use super::CloneSpec;
use crate::error::RepoError;

/// Maximum stderr kept in a [`RepoError::CommandFailed`].
const STDERR_TAIL: usize = 2000;

/// Directory name of the working tree for a task index.
pub fn repo_dir_name(index: u32) -> String {
    format!("repo_{index}")
}

/// Version-control operations the pipeline and the agents rely on.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Clone `url` into `dest`.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), RepoError>;

    /// Check out `commit` inside `repo`.
    async fn checkout(&self, repo: &Path, commit: &str) -> Result<(), RepoError>;

    /// Stage `pathspec` (a file or `.`) inside `repo`.
    async fn add(&self, repo: &Path, pathspec: &str) -> Result<(), RepoError>;
}

/// [`VersionControl`] backed by the `git` executable.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    timeout: Option<Duration>,
}

impl GitCli {
    /// Create a git driver. `timeout` of `None` lets commands run indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, RepoError> {
        let display = format!("git {}", args.join(" "));
        let mut cmd = Command::new("git");
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output_future = cmd.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output_future)
                .await
                .map_err(|_| RepoError::Timeout {
                    command: display.clone(),
                    seconds: limit.as_secs(),
                })?,
            None => output_future.await,
        }
        .map_err(|e| RepoError::Spawn(format!("{display}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepoError::CommandFailed {
                command: display,
                code: output.status.code().unwrap_or(-1),
                stderr: tail(stderr.trim(), STDERR_TAIL),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), RepoError> {
        let dest = dest.to_string_lossy();
        self.run(&clone_args(url, &dest), None).await.map(|_| ())
    }

    async fn checkout(&self, repo: &Path, commit: &str) -> Result<(), RepoError> {
        self.run(&["checkout", commit], Some(repo)).await.map(|_| ())
    }

    async fn add(&self, repo: &Path, pathspec: &str) -> Result<(), RepoError> {
        self.run(&["add", "--", pathspec], Some(repo)).await.map(|_| ())
    }
}

/// Arguments for `git clone`. `--` keeps a hostile URL from being read as an option.
fn clone_args<'a>(url: &'a str, dest: &'a str) -> [&'a str; 4] {
    ["clone", "--", url, dest]
}

/// Keep the last `max` bytes of `s`, on a char boundary.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &s[start..])
}

/// Clones task repositories into index-scoped directories.
#[derive(Clone)]
pub struct RepoPreparer {
    repos_dir: PathBuf,
    vcs: Arc<dyn VersionControl>,
}

impl RepoPreparer {
    pub fn new(repos_dir: impl Into<PathBuf>, vcs: Arc<dyn VersionControl>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            vcs,
        }
    }

    /// Working tree location for a task index.
    pub fn repo_path(&self, index: u32) -> PathBuf {
        self.repos_dir.join(repo_dir_name(index))
    }

    /// Clone the repository for `index` and check out the requested commit.
    ///
    /// A leftover directory from an earlier run is removed first, so the
    /// returned tree always comes from a fresh clone.
    pub async fn prepare(&self, index: u32, spec: &CloneSpec) -> Result<PathBuf, RepoError> {
        let dest = self.repo_path(index);

        if dest.exists() {
            warn!(index, path = %dest.display(), "Removing stale repository directory");
            tokio::fs::remove_dir_all(&dest).await?;
        }
        tokio::fs::create_dir_all(&self.repos_dir).await?;

        info!(index, url = %spec.url, path = %dest.display(), "Cloning repository");
        self.vcs.clone_repo(&spec.url, &dest).await?;

        if let Some(commit) = &spec.commit {
            info!(index, commit = %commit, "Checking out commit");
            self.vcs.checkout(&dest, commit).await?;
        }

        Ok(dest)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call and materializes clones as empty directories.
    #[derive(Default)]
    pub(crate) struct RecordingVcs {
        pub calls: Mutex<Vec<String>>,
        pub fail_checkout: bool,
    }

    #[async_trait]
    impl VersionControl for RecordingVcs {
        async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), RepoError> {
            self.calls.lock().unwrap().push(format!("clone {url}"));
            std::fs::create_dir_all(dest)?;
            Ok(())
        }

        async fn checkout(&self, _repo: &Path, commit: &str) -> Result<(), RepoError> {
            self.calls.lock().unwrap().push(format!("checkout {commit}"));
            if self.fail_checkout {
                return Err(RepoError::CommandFailed {
                    command: format!("git checkout {commit}"),
                    code: 128,
                    stderr: "fatal: reference is not a tree".to_string(),
                });
            }
            Ok(())
        }

        async fn add(&self, _repo: &Path, pathspec: &str) -> Result<(), RepoError> {
            self.calls.lock().unwrap().push(format!("add {pathspec}"));
            Ok(())
        }
    }

    #[test]
    fn repo_dir_is_index_scoped() {
        assert_eq!(repo_dir_name(12), "repo_12");
    }

    #[tokio::test]
    async fn prepare_clones_then_checks_out() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(RecordingVcs::default());
        let preparer = RepoPreparer::new(tmp.path().join("repos"), vcs.clone());

        let spec = CloneSpec::parse("git clone https://x/y.git && git checkout abc123").unwrap();
        let path = preparer.prepare(3, &spec).await.unwrap();

        assert_eq!(path, tmp.path().join("repos").join("repo_3"));
        assert_eq!(
            *vcs.calls.lock().unwrap(),
            vec!["clone https://x/y.git", "checkout abc123"]
        );
    }

    #[tokio::test]
    async fn prepare_without_commit_skips_checkout() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(RecordingVcs::default());
        let preparer = RepoPreparer::new(tmp.path(), vcs.clone());

        let spec = CloneSpec::parse("git clone https://x/y.git").unwrap();
        preparer.prepare(1, &spec).await.unwrap();

        assert_eq!(*vcs.calls.lock().unwrap(), vec!["clone https://x/y.git"]);
    }

    #[tokio::test]
    async fn prepare_replaces_stale_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let stale = tmp.path().join("repo_5");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("leftover.txt"), "old").unwrap();

        let preparer = RepoPreparer::new(tmp.path(), Arc::new(RecordingVcs::default()));
        let spec = CloneSpec::parse("git clone https://x/y.git").unwrap();
        let path = preparer.prepare(5, &spec).await.unwrap();

        assert!(path.exists());
        assert!(!path.join("leftover.txt").exists());
    }

    #[tokio::test]
    async fn prepare_propagates_checkout_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(RecordingVcs {
            fail_checkout: true,
            ..Default::default()
        });
        let preparer = RepoPreparer::new(tmp.path(), vcs);
        let spec = CloneSpec::parse("git clone https://x/y.git && git checkout abc").unwrap();

        let err = preparer.prepare(2, &spec).await.unwrap_err();
        assert!(matches!(err, RepoError::CommandFailed { code: 128, .. }));
    }

    #[tokio::test]
    async fn git_cli_fails_in_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("does-not-exist");
        let result = GitCli::new(Some(Duration::from_secs(10)))
            .checkout(&missing, "abc")
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn clone_args_end_option_parsing_before_url() {
        assert_eq!(
            clone_args("--upload-pack=touch pwned", "/repos/repo_1"),
            ["clone", "--", "--upload-pack=touch pwned", "/repos/repo_1"]
        );
    }

    #[tokio::test]
    async fn git_cli_treats_flag_like_url_as_repository() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("pwned");
        let url = format!("--upload-pack=touch {}", marker.display());

        let result = GitCli::new(Some(Duration::from_secs(10)))
            .clone_repo(&url, &tmp.path().join("repo_1"))
            .await;

        assert!(result.is_err());
        assert!(!marker.exists());
    }

    #[test]
    fn tail_keeps_end_of_output() {
        assert_eq!(tail("short", 10), "short");
        let long = format!("{}END", "x".repeat(50));
        let kept = tail(&long, 5);
        assert!(kept.starts_with("..."));
        assert!(kept.ends_with("END"));
    }
}
