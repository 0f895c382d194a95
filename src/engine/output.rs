//! Engine output records and stream decoding.
//!
//! Docker reports build and push progress as newline-delimited JSON objects,
//! e.g. `{"stream":"Step 1/4 : FROM alpine\n"}` or
//! `{"status":"Pushing","progress":"[==>  ] 1.2MB/5MB"}`. Both the Docker
//! adapter and raw readers are normalized into an [`OutputStream`].

use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec};

use super::EngineError;

/// Live output of one build or push.
pub type OutputStream = BoxStream<'static, Result<OutputLine, EngineError>>;

/// One record of engine output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputLine {
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OutputLine {
    /// A record carrying build log text.
    pub fn stream(text: impl Into<String>) -> Self {
        OutputLine {
            stream: Some(text.into()),
            ..Default::default()
        }
    }

    /// A record carrying an engine error message.
    pub fn error(message: impl Into<String>) -> Self {
        OutputLine {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Returns the human-readable text of the record.
    ///
    /// Build logs arrive in `stream` and already end in a newline; push
    /// progress arrives as `status` plus `progress` and does not.
    pub fn text(&self) -> String {
        let mut text = String::new();
        if let Some(stream) = &self.stream {
            text.push_str(stream);
        }
        if let Some(status) = &self.status {
            text.push_str(status);
            if let Some(progress) = &self.progress {
                text.push(' ');
                text.push_str(progress);
            }
            text.push('\n');
        }
        if let Some(error) = &self.error {
            text.push_str(error);
            text.push('\n');
        }
        text
    }
}

impl From<bollard::models::BuildInfo> for OutputLine {
    fn from(info: bollard::models::BuildInfo) -> Self {
        OutputLine {
            stream: info.stream,
            status: info.status,
            progress: info.progress,
            error: info.error,
        }
    }
}

impl From<bollard::models::PushImageInfo> for OutputLine {
    fn from(info: bollard::models::PushImageInfo) -> Self {
        OutputLine {
            stream: None,
            status: info.status,
            progress: info.progress,
            error: info.error,
        }
    }
}

/// Decodes a raw newline-delimited JSON reader into an [`OutputStream`].
///
/// Blank lines are skipped. A malformed line yields an `Err` item and the
/// consumer is expected to stop reading.
pub fn decode_lines<R>(reader: R) -> OutputStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    FramedRead::new(reader, LinesCodec::new())
        .filter_map(|line| async move {
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str::<OutputLine>(&line).map_err(EngineError::from)),
                Err(e) => Some(Err(EngineError::from(e))),
            }
        })
        .boxed()
}
