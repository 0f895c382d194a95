//! Notification sinks for build and push output.
//!
//! Exactly one sink is active per process, chosen at startup:
//!
//! - [`Sink::Console`] renders to stdout
//! - [`Sink::Chat`] buffers output and posts one message per build/push
//! - [`Sink::Disabled`] renders nothing
//!
//! Every variant drains the stream, classifies the build, and records the
//! finished report in the [`StatsLedger`].

mod chat;
mod console;
mod scan;

pub use chat::{Attachment, AttachmentField, ChatError, ChatMessage, ChatSink, SLACK_POST_MESSAGE_URL};
pub use console::ConsoleSink;
pub use scan::{StreamEnd, drain, is_build_success, scan_build, scan_push};

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::engine::OutputStream;
use crate::report::{BuildStatus, BuildStatusReport, StatsLedger};
use crate::types::ImageRef;

/// Consumes live build and push output.
#[async_trait]
pub trait BuildNotify: Send + Sync {
    /// Drains build output, classifies the build, records `report` in the
    /// ledger and returns the terminal status.
    async fn send_build_report(
        &self,
        token: &CancellationToken,
        output: OutputStream,
        report: BuildStatusReport,
    ) -> BuildStatus;

    /// Drains and renders push output and reports how the push stream ended.
    async fn send_push_report(
        &self,
        token: &CancellationToken,
        output: OutputStream,
        image: &ImageRef,
    ) -> StreamEnd;
}

/// The configured rendering target.
#[derive(Debug, Clone)]
pub enum Sink {
    Console(ConsoleSink),
    Chat(ChatSink),
    Disabled,
}

/// The process-wide notification sink plus the ledger it records into.
#[derive(Debug, Clone)]
pub struct Notifier {
    sink: Sink,
    ledger: Arc<StatsLedger>,
}

impl Notifier {
    pub fn new(sink: Sink, ledger: Arc<StatsLedger>) -> Self {
        Self { sink, ledger }
    }

    pub fn console(ledger: Arc<StatsLedger>) -> Self {
        Self::new(Sink::Console(ConsoleSink::stdout()), ledger)
    }

    pub fn chat(chat: ChatSink, ledger: Arc<StatsLedger>) -> Self {
        Self::new(Sink::Chat(chat), ledger)
    }

    pub fn disabled(ledger: Arc<StatsLedger>) -> Self {
        Self::new(Sink::Disabled, ledger)
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    /// Short name of the active sink, for logs.
    pub fn kind(&self) -> &'static str {
        match self.sink {
            Sink::Console(_) => "console",
            Sink::Chat(_) => "chat",
            Sink::Disabled => "disabled",
        }
    }

    fn record(&self, mut report: BuildStatusReport) {
        report.finish();
        self.ledger.append(report);
    }
}

/// Posts `message` unless `token` fires first.
async fn post_unless_cancelled(
    chat: &ChatSink,
    token: &CancellationToken,
    message: &ChatMessage,
) -> Result<(), ChatError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            warn!(channel = chat.channel(), "Build cancelled, chat message dropped");
            Ok(())
        }
        result = chat.post(message) => result,
    }
}

#[async_trait]
impl BuildNotify for Notifier {
    async fn send_build_report(
        &self,
        token: &CancellationToken,
        output: OutputStream,
        mut report: BuildStatusReport,
    ) -> BuildStatus {
        match &self.sink {
            Sink::Console(console) => {
                let status = console.render_build(token, output, &mut report).await;
                self.record(report);
                status
            }
            Sink::Chat(chat) => {
                let (status, message) = chat.render_build(token, output, &mut report).await;
                self.record(report);
                if let Err(e) = post_unless_cancelled(chat, token, &message).await {
                    error!(channel = chat.channel(), error = %e, "Failed to post build report");
                }
                status
            }
            Sink::Disabled => {
                let status = scan_build(token, output, &mut report, |_| {}).await;
                self.record(report);
                status
            }
        }
    }

    async fn send_push_report(
        &self,
        token: &CancellationToken,
        output: OutputStream,
        image: &ImageRef,
    ) -> StreamEnd {
        match &self.sink {
            Sink::Console(console) => console.render_push(token, output, image).await,
            Sink::Chat(chat) => {
                let (end, message) = chat.render_push(token, output, image).await;
                if let Err(e) = post_unless_cancelled(chat, token, &message).await {
                    error!(channel = chat.channel(), image = %image, error = %e, "Failed to post push report");
                }
                end
            }
            Sink::Disabled => scan_push(token, output, |_| {}).await,
        }
    }
}
