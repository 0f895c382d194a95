//! Container engine error types.

use thiserror::Error;

/// Transport-level failures talking to the container engine, and failures to
/// decode its output stream.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The Docker API returned an error or could not be reached.
    #[error("docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Reading the raw output stream failed.
    #[error("failed to read engine output: {0}")]
    Read(#[from] tokio_util::codec::LinesCodecError),

    /// An output record was not valid JSON.
    #[error("malformed engine output line: {0}")]
    Decode(#[from] serde_json::Error),

    /// The registry could not be reached to check credentials.
    #[error("registry request failed: {0}")]
    Registry(#[from] reqwest::Error),

    /// The registry rejected the configured credentials.
    #[error("registry login failed for {registry}: {reason}")]
    LoginRejected { registry: String, reason: String },

    /// The engine reported an error record in a push stream.
    #[error("engine reported: {0}")]
    Rejected(String),

    /// The engine closed the output stream before sending anything.
    #[error("engine returned no response for {0}")]
    EmptyResponse(String),
}
