//! Chat sink: posts build and push reports to a Slack channel.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::scan::{StreamEnd, scan_build, scan_push};
use crate::engine::OutputStream;
use crate::report::{BuildStatus, BuildStatusReport};
use crate::types::ImageRef;

/// Slack Web API method used to post messages.
pub const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

const BOT_NAME: &str = "microci";
const BOT_ICON: &str = ":whale:";

const CHAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors posting to the chat API.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request could not be sent or the response was unreadable.
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with `ok: false`.
    #[error("chat API rejected message: {0}")]
    Api(String),
}

/// A `chat.postMessage` request body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub channel: String,
    pub username: &'static str,
    pub icon_emoji: &'static str,
    pub mrkdwn: bool,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Attachment {
    pub pretext: String,
    pub text: String,
    pub fields: Vec<AttachmentField>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
}

impl AttachmentField {
    fn new(title: &str, value: impl Into<String>) -> Self {
        AttachmentField {
            title: title.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// Buffers output and posts one message per build or push.
#[derive(Clone)]
pub struct ChatSink {
    client: Client,
    token: String,
    channel: String,
    endpoint: String,
}

impl ChatSink {
    /// Creates a sink posting to `channel` with the bot `token`.
    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> Result<Self, ChatError> {
        let client = Client::builder()
            .user_agent(BOT_NAME)
            .timeout(CHAT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            token: token.into(),
            channel: channel.into(),
            endpoint: SLACK_POST_MESSAGE_URL.to_string(),
        })
    }

    /// Overrides the API endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Streams build output into a buffer and classifies the build. The
    /// returned message is ready to post.
    pub async fn render_build(
        &self,
        token: &CancellationToken,
        output: OutputStream,
        report: &mut BuildStatusReport,
    ) -> (BuildStatus, ChatMessage) {
        let mut text = String::new();
        let status = scan_build(token, output, report, |line| text.push_str(line)).await;
        let duration = report.finish();
        (status, self.build_message(report, &text, duration))
    }

    /// Streams push output into a buffer and returns the message to post.
    pub async fn render_push(
        &self,
        token: &CancellationToken,
        output: OutputStream,
        image: &ImageRef,
    ) -> (StreamEnd, ChatMessage) {
        let start = Instant::now();
        let mut text = String::new();
        let end = scan_push(token, output, |line| text.push_str(line)).await;
        (end, self.push_message(image, &text, start.elapsed()))
    }

    pub fn build_message(
        &self,
        report: &BuildStatusReport,
        output: &str,
        duration: Duration,
    ) -> ChatMessage {
        self.message(Attachment {
            pretext: "*New Docker build report from MicroCI*".to_string(),
            text: output.trim_end().to_string(),
            fields: vec![
                AttachmentField::new("Status", report.status().as_str()),
                AttachmentField::new("Duration", format!("{duration:?}")),
                AttachmentField::new("Git Context", &report.build_context),
            ],
        })
    }

    pub fn push_message(&self, image: &ImageRef, output: &str, duration: Duration) -> ChatMessage {
        self.message(Attachment {
            pretext: format!("*New Docker push report from MicroCI* `{image}`"),
            text: output.trim_end().to_string(),
            fields: vec![AttachmentField::new("Duration", format!("{duration:?}"))],
        })
    }

    fn message(&self, attachment: Attachment) -> ChatMessage {
        ChatMessage {
            channel: self.channel.clone(),
            username: BOT_NAME,
            icon_emoji: BOT_ICON,
            mrkdwn: true,
            attachments: vec![attachment],
        }
    }

    /// Posts a message. Not retried.
    pub async fn post(&self, message: &ChatMessage) -> Result<(), ChatError> {
        let response: PostMessageResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(message)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            return Err(ChatError::Api(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        debug!(
            channel = response.channel.as_deref().unwrap_or(&self.channel),
            ts = response.ts.as_deref().unwrap_or_default(),
            "Message successfully sent to channel"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ChatSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSink")
            .field("channel", &self.channel)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decode_lines;
    use crate::test_utils::{FakeChatApi, sample_report};

    fn sink() -> ChatSink {
        ChatSink::new("xoxb-token", "#builds").unwrap()
    }

    #[test]
    fn build_message_fields() {
        let mut report = sample_report();
        report.set_status(BuildStatus::Running);
        report.set_status(BuildStatus::Failed);

        let message = sink().build_message(&report, "step 1\nstep 2\n", Duration::from_secs(2));

        assert_eq!(message.channel, "#builds");
        assert_eq!(message.username, "microci");
        assert_eq!(message.icon_emoji, ":whale:");
        let attachment = &message.attachments[0];
        assert_eq!(attachment.text, "step 1\nstep 2");
        assert_eq!(
            attachment.fields,
            vec![
                AttachmentField::new("Status", "Failed"),
                AttachmentField::new("Duration", "2s"),
                AttachmentField::new("Git Context", "https://github.com/acme/widgets.git#main"),
            ]
        );
    }

    #[test]
    fn push_message_names_image() {
        let message = sink().push_message(
            &ImageRef::new("acme/widgets", "main"),
            "Pushed\n",
            Duration::from_millis(1500),
        );
        let attachment = &message.attachments[0];
        assert!(attachment.pretext.contains("acme/widgets:main"));
        assert_eq!(attachment.fields, vec![AttachmentField::new("Duration", "1.5s")]);
    }

    #[tokio::test]
    async fn render_build_buffers_all_output() {
        let mut report = sample_report();
        let (status, message) = sink()
            .render_build(
                &CancellationToken::new(),
                decode_lines(
                    "{\"stream\":\"a\\n\"}\n{\"stream\":\"Successfully built abcd1234abcd\\n\"}\n"
                        .as_bytes(),
                ),
                &mut report,
            )
            .await;

        assert_eq!(status, BuildStatus::Passed);
        assert_eq!(
            message.attachments[0].text,
            "a\nSuccessfully built abcd1234abcd"
        );
        assert!(report.duration().is_some());
    }

    #[tokio::test]
    async fn post_sends_bearer_token_and_body() {
        let api = FakeChatApi::start(true).await;
        let sink = sink().with_endpoint(api.url());
        let message = sink.push_message(&ImageRef::new("a/b", "c"), "", Duration::ZERO);

        sink.post(&message).await.unwrap();

        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer xoxb-token"));
        assert_eq!(requests[0].body["channel"], "#builds");
        assert_eq!(requests[0].body["username"], "microci");
    }

    #[tokio::test]
    async fn post_surfaces_api_rejection() {
        let api = FakeChatApi::start(false).await;
        let sink = sink().with_endpoint(api.url());
        let message = sink.push_message(&ImageRef::new("a/b", "c"), "", Duration::ZERO);

        let result = sink.post(&message).await;
        assert!(matches!(result, Err(ChatError::Api(reason)) if reason == "channel_not_found"));
    }
}
