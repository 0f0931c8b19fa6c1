//! Per-run context handed to every pipeline stage.

use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::swe::ResultLog;

/// State shared by all tasks of one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    log: ResultLog,
    original_dir: PathBuf,
}

impl RunContext {
    /// Capture the current working directory as the one to restore after
    /// every task.
    pub fn new(log: ResultLog) -> std::io::Result<Self> {
        Ok(Self {
            run_id: Uuid::new_v4(),
            log,
            original_dir: std::env::current_dir()?,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn log(&self) -> &ResultLog {
        &self.log
    }

    pub fn original_dir(&self) -> &Path {
        &self.original_dir
    }

    /// Guard that puts the working directory back when the task scope ends.
    pub fn workdir_guard(&self) -> WorkdirGuard {
        WorkdirGuard::new(self.original_dir.clone())
    }
}

/// Restores the process working directory on drop.
///
/// Nothing in this crate changes directory, but a task must never leak a
/// changed cwd into the next one, so every task runs under a guard.
#[derive(Debug)]
pub struct WorkdirGuard {
    original: PathBuf,
}

impl WorkdirGuard {
    pub fn new(original: impl Into<PathBuf>) -> Self {
        Self {
            original: original.into(),
        }
    }

    /// Guard for the directory the process is in right now.
    pub fn capture() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn original(&self) -> &Path {
        &self.original
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        let unchanged = std::env::current_dir()
            .map(|cwd| cwd == self.original)
            .unwrap_or(false);
        if unchanged {
            return;
        }
        if let Err(e) = std::env::set_current_dir(&self.original) {
            warn!(
                path = %self.original.display(),
                error = %e,
                "Failed to restore working directory"
            );
        }
    }
}
