//! Build pipeline error types.

use thiserror::Error;

use crate::engine::EngineError;

/// Transport-level failures that abort a build.
///
/// A Dockerfile that fails to build is not an error; it ends as
/// [`BuildStatus::Failed`](crate::report::BuildStatus::Failed).
#[derive(Debug, Error)]
pub enum BuildError {
    /// Registry login was rejected or the engine was unreachable.
    #[error("registry login failed: {0}")]
    Login(#[source] EngineError),

    /// The build request could not be started.
    #[error("failed to start image build: {0}")]
    Build(#[source] EngineError),

    /// Tagging the built image failed.
    #[error("failed to tag image: {0}")]
    Tag(#[source] EngineError),

    /// A push request could not be started.
    #[error("failed to push {image}: {source}")]
    Push {
        image: String,
        #[source]
        source: EngineError,
    },

    /// The build was cancelled before an engine request completed.
    #[error("build cancelled")]
    Cancelled,
}
