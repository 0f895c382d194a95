//! Newtype wrappers for source-control identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A repository identifier (owner/repo format).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Returns the `owner/repo` form GitHub calls the full name.
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A git reference as delivered by GitHub: a full ref (`refs/heads/main`),
/// a bare branch or tag name, or a commit SHA.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GitRef(pub String);

impl GitRef {
    pub fn new(s: impl Into<String>) -> Self {
        GitRef(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the trailing path segment of the ref.
    ///
    /// `refs/heads/main` becomes `main`; `refs/heads/feature/login` becomes
    /// `login`. A ref without separators is returned unchanged.
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GitRef {
    fn from(s: &str) -> Self {
        GitRef(s.to_string())
    }
}

impl From<String> for GitRef {
    fn from(s: String) -> Self {
        GitRef(s)
    }
}
