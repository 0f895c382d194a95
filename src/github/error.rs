//! Commit status error types.

use thiserror::Error;

/// Failure to publish a commit status. Always logged and dropped by callers.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The GitHub API rejected the request or could not be reached.
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// The report carries no commit to attach the status to.
    #[error("no commit SHA to attach status to")]
    MissingSha,
}
