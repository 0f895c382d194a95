//! GitHub commit status reporting.
//!
//! Build status transitions are mirrored to the commit they were triggered by,
//! so the result shows up next to the commit and on any open pull request.
//! Updates are best effort: the caller logs failures and moves on.

mod client;
mod error;

pub use client::GitHubStatusClient;
pub use error::StatusError;

use async_trait::async_trait;

use crate::report::BuildStatus;
use crate::types::RepoId;

/// Context string shown next to the commit status on GitHub.
pub const STATUS_CONTEXT: &str = "continuous-integration/microci";

/// Receives build status transitions for a commit.
#[async_trait]
pub trait CommitStatusSink: Send + Sync {
    /// Sets the status of `sha` in `repo`.
    async fn update_status(
        &self,
        repo: &RepoId,
        sha: &str,
        status: BuildStatus,
    ) -> Result<(), StatusError>;
}

/// Maps a build status onto GitHub's commit states
/// (`pending`, `success`, `failure`, `error`).
pub fn commit_state(status: BuildStatus) -> &'static str {
    match status {
        BuildStatus::Unknown | BuildStatus::Running => "pending",
        BuildStatus::Passed => "success",
        BuildStatus::Failed => "failure",
        BuildStatus::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_state_mapping() {
        assert_eq!(commit_state(BuildStatus::Unknown), "pending");
        assert_eq!(commit_state(BuildStatus::Running), "pending");
        assert_eq!(commit_state(BuildStatus::Passed), "success");
        assert_eq!(commit_state(BuildStatus::Failed), "failure");
        assert_eq!(commit_state(BuildStatus::Error), "error");
    }
}
