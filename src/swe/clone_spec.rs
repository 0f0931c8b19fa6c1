//! Parser for the combined clone + checkout command shipped with each task.
//!
//! The index service describes the repository as a shell snippet such as
//! `git clone https://github.com/org/repo.git && git checkout 1a2b3c`. Only two
//! facts are taken from it: the repository URL and, when a checkout clause is
//! present, the commit to check out. Nothing from the snippet is ever handed
//! to a shell.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::validate_git_ref;

/// Token separating the clone clause from the checkout clause.
const CLAUSE_SEPARATOR: &str = "&&";

/// Ways a clone command can be malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloneParseError {
    #[error("clone command is empty")]
    Empty,

    #[error("first clause '{0}' is not a 'git clone' command")]
    NotACloneCommand(String),

    #[error("clone clause '{0}' has no repository URL")]
    MissingUrl(String),

    #[error("repository URL '{0}' must not start with '-'")]
    InvalidUrl(String),

    #[error("checkout clause is empty")]
    EmptyCheckout,

    #[error("invalid commit '{commit}': {reason}")]
    InvalidCommit { commit: String, reason: String },
}

/// Repository location extracted from a clone command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSpec {
    /// URL passed to `git clone`.
    pub url: String,
    /// Commit to check out after cloning, if the command had a checkout clause.
    pub commit: Option<String>,
}

impl CloneSpec {
    /// Parse a clone command.
    ///
    /// The URL is the third whitespace-separated token of the first clause.
    /// The commit is the last token of the last clause, and only exists when
    /// the command has more than one clause.
    pub fn parse(command: &str) -> Result<Self, CloneParseError> {
        if command.trim().is_empty() {
            return Err(CloneParseError::Empty);
        }

        let clauses: Vec<&str> = command.split(CLAUSE_SEPARATOR).map(str::trim).collect();

        let clone_clause = clauses[0];
        let tokens: Vec<&str> = clone_clause.split_whitespace().collect();
        if tokens.len() < 2 || tokens[0] != "git" || tokens[1] != "clone" {
            return Err(CloneParseError::NotACloneCommand(clone_clause.to_string()));
        }
        let url = tokens
            .get(2)
            .ok_or_else(|| CloneParseError::MissingUrl(clone_clause.to_string()))?
            .to_string();
        if url.starts_with('-') {
            return Err(CloneParseError::InvalidUrl(url));
        }

        let commit = if clauses.len() > 1 {
            let checkout_clause = clauses[clauses.len() - 1];
            let commit = checkout_clause
                .split_whitespace()
                .last()
                .ok_or(CloneParseError::EmptyCheckout)?;
            validate_git_ref(commit).map_err(|e| CloneParseError::InvalidCommit {
                commit: commit.to_string(),
                reason: e.to_string(),
            })?;
            Some(commit.to_string())
        } else {
            None
        };

        Ok(Self { url, commit })
    }
}

impl std::str::FromStr for CloneSpec {
    type Err = CloneParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
