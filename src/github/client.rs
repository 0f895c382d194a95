//! Octocrab client that posts commit statuses.

use async_trait::async_trait;
use octocrab::Octocrab;
use serde::Serialize;
use tracing::debug;

use super::{CommitStatusSink, STATUS_CONTEXT, StatusError, commit_state};
use crate::report::BuildStatus;
use crate::types::RepoId;

/// A GitHub API client used for commit statuses.
#[derive(Clone)]
pub struct GitHubStatusClient {
    client: Octocrab,
}

impl GitHubStatusClient {
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Creates a client authenticated with a personal access token.
    pub fn from_token(token: impl Into<String>) -> Result<Self, StatusError> {
        let client = Octocrab::builder().personal_token(token.into()).build()?;
        Ok(Self::new(client))
    }
}

impl std::fmt::Debug for GitHubStatusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubStatusClient").finish_non_exhaustive()
    }
}

/// Body of `POST /repos/{owner}/{repo}/statuses/{sha}`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct StatusRequest {
    state: &'static str,
    context: &'static str,
    description: String,
}

impl StatusRequest {
    pub(crate) fn new(status: BuildStatus) -> Self {
        StatusRequest {
            state: commit_state(status),
            context: STATUS_CONTEXT,
            description: format!("MicroCI build {}", status.as_str().to_lowercase()),
        }
    }
}

pub(crate) fn status_route(repo: &RepoId, sha: &str) -> String {
    format!("/repos/{}/{}/statuses/{}", repo.owner, repo.repo, sha)
}

#[async_trait]
impl CommitStatusSink for GitHubStatusClient {
    async fn update_status(
        &self,
        repo: &RepoId,
        sha: &str,
        status: BuildStatus,
    ) -> Result<(), StatusError> {
        if sha.is_empty() {
            return Err(StatusError::MissingSha);
        }

        let route = status_route(repo, sha);
        let request = StatusRequest::new(status);

        let _: serde_json::Value = self.client.post(&route, Some(&request)).await?;

        debug!(
            repo = %repo,
            sha = %sha,
            state = request.state,
            "Commit status updated"
        );
        Ok(())
    }
}
