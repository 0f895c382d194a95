//! Draining engine output and classifying builds.

use std::sync::LazyLock;

use futures::StreamExt;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::engine::{EngineError, OutputLine, OutputStream};
use crate::report::{BuildStatus, BuildStatusReport};

/// Docker's classic builder ends a successful build with this line.
static BUILD_SUCCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Successfully built ([0-9a-f]{12})").expect("build success pattern is valid")
});

/// Returns true if `text` contains Docker's build success marker.
pub fn is_build_success(text: &str) -> bool {
    BUILD_SUCCESS.is_match(text)
}

/// Why reading an output stream stopped.
#[derive(Debug)]
pub enum StreamEnd {
    /// The engine closed the stream.
    Exhausted,
    /// A record could not be read or decoded.
    Failed(EngineError),
    /// The build's cancellation token fired.
    Cancelled,
}

/// Feeds every record to `on_line` until the stream ends, fails, or `token`
/// is cancelled. Records already handed to `on_line` stay handled.
pub async fn drain(
    token: &CancellationToken,
    mut output: OutputStream,
    mut on_line: impl FnMut(&OutputLine),
) -> StreamEnd {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return StreamEnd::Cancelled,
            item = output.next() => match item {
                Some(Ok(line)) => on_line(&line),
                Some(Err(e)) => return StreamEnd::Failed(e),
                None => return StreamEnd::Exhausted,
            },
        }
    }
}

/// Drains build output into `render` and classifies the build.
///
/// - a success marker moves the report to `Passed`
/// - end of stream without one moves it to `Failed`
/// - a read/decode error or cancellation moves it to `Error`, even after
///   `Passed`
///
/// Each transition is published to the report's status sink.
pub async fn scan_build(
    token: &CancellationToken,
    output: OutputStream,
    report: &mut BuildStatusReport,
    mut render: impl FnMut(&str),
) -> BuildStatus {
    if report.status() == BuildStatus::Unknown {
        report.advance(BuildStatus::Running);
    }

    let end = drain(token, output, |line| {
        let text = line.text();
        render(&text);
        if report.status() != BuildStatus::Passed && is_build_success(&text) {
            report.advance(BuildStatus::Passed);
        }
    })
    .await;

    match end {
        StreamEnd::Exhausted => {
            if report.status() != BuildStatus::Passed {
                report.advance(BuildStatus::Failed);
            }
        }
        StreamEnd::Failed(e) => {
            error!(tag = %report.tag, error = %e, "Failed to read build output");
            report.advance(BuildStatus::Error);
        }
        StreamEnd::Cancelled => {
            warn!(tag = %report.tag, "Build cancelled while streaming output");
            report.advance(BuildStatus::Error);
        }
    }
    report.status()
}

/// Drains push output into `render`.
///
/// Push output carries no build status, but an error record from the engine
/// (for example a registry refusing the upload) ends the push as
/// [`StreamEnd::Failed`] with [`EngineError::Rejected`].
pub async fn scan_push(
    token: &CancellationToken,
    output: OutputStream,
    mut render: impl FnMut(&str),
) -> StreamEnd {
    let mut rejected = None;
    let end = drain(token, output, |line| {
        render(&line.text());
        if rejected.is_none() {
            rejected = line.error.clone();
        }
    })
    .await;
    let end = match (end, rejected) {
        (StreamEnd::Exhausted, Some(error)) => StreamEnd::Failed(EngineError::Rejected(error)),
        (end, _) => end,
    };
    match &end {
        StreamEnd::Exhausted => {}
        StreamEnd::Failed(e) => error!(error = %e, "Failed to read push output"),
        StreamEnd::Cancelled => warn!("Push cancelled while streaming output"),
    }
    end
}
