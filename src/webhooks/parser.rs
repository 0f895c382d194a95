//! GitHub webhook payload parser.
//!
//! Parses raw webhook JSON payloads into typed [`WebhookEvent`] values. The
//! parser tolerates unknown fields and unknown event types.
//!
//! # Parsing Strategy
//!
//! 1. The event type is determined from the `X-GitHub-Event` header
//! 2. The payload is parsed according to the event type
//! 3. Unknown event types return `Ok(None)` (ignored, not error)
//! 4. Malformed payloads return `Err` with details

use serde::Deserialize;
use thiserror::Error;

use crate::types::{GitRef, RepoId};

use super::events::{CreateEvent, PushEvent, RefType, WebhookEvent};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Field has an invalid value.
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a webhook payload into a typed event.
///
/// * `Ok(Some(event))` - a `push` or `create` event
/// * `Ok(None)` - any other event type (ignored, not an error)
/// * `Err(e)` - malformed payload or missing required fields
///
/// # Examples
///
/// ```
/// use microci::webhooks::{parse_webhook, WebhookEvent};
///
/// let payload = br#"{
///     "ref": "v1.0.0",
///     "ref_type": "tag",
///     "repository": {
///         "name": "widgets",
///         "full_name": "acme/widgets",
///         "clone_url": "https://github.com/acme/widgets.git",
///         "owner": { "login": "acme" }
///     }
/// }"#;
///
/// let event = parse_webhook("create", payload).unwrap();
/// assert!(matches!(event, Some(WebhookEvent::Create(_))));
/// assert!(parse_webhook("ping", b"{}").unwrap().is_none());
/// ```
pub fn parse_webhook(event_type: &str, payload: &[u8]) -> Result<Option<WebhookEvent>, ParseError> {
    match event_type {
        "push" => parse_push(payload).map(|e| Some(WebhookEvent::Push(e))),
        "create" => parse_create(payload).map(|e| Some(WebhookEvent::Create(e))),
        _ => Ok(None),
    }
}

// Raw payload structures. These follow GitHub's JSON layout and keep only
// the fields a build needs.

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: String,
    full_name: Option<String>,
    clone_url: String,
    owner: RawOwner,
}

/// Push payloads carry the owner's `name`; other events carry `login`.
#[derive(Debug, Deserialize)]
struct RawOwner {
    login: Option<String>,
    name: Option<String>,
}

impl RawRepository {
    fn repo_id(&self) -> Result<RepoId, ParseError> {
        let owner = self
            .owner
            .login
            .clone()
            .or_else(|| self.owner.name.clone())
            .or_else(|| {
                self.full_name
                    .as_deref()
                    .and_then(|full| full.split_once('/'))
                    .map(|(owner, _)| owner.to_string())
            })
            .filter(|owner| !owner.is_empty())
            .ok_or_else(|| ParseError::InvalidField {
                field: "repository.owner",
                value: String::new(),
            })?;
        Ok(RepoId::new(owner, &self.name))
    }
}

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    deleted: bool,
    head_commit: Option<RawCommit>,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    id: String,
}

fn parse_push(payload: &[u8]) -> Result<PushEvent, ParseError> {
    let raw: RawPushPayload = serde_json::from_slice(payload)?;

    if raw.git_ref.is_empty() {
        return Err(ParseError::InvalidField {
            field: "ref",
            value: raw.git_ref,
        });
    }

    Ok(PushEvent {
        repo: raw.repository.repo_id()?,
        clone_url: raw.repository.clone_url,
        git_ref: GitRef::new(raw.git_ref),
        head_commit: raw.head_commit.map(|c| c.id).filter(|id| !id.is_empty()),
        deleted: raw.deleted,
    })
}

#[derive(Debug, Deserialize)]
struct RawCreatePayload {
    #[serde(rename = "ref")]
    git_ref: String,
    ref_type: String,
    repository: RawRepository,
}

fn parse_create(payload: &[u8]) -> Result<CreateEvent, ParseError> {
    let raw: RawCreatePayload = serde_json::from_slice(payload)?;

    Ok(CreateEvent {
        repo: raw.repository.repo_id()?,
        clone_url: raw.repository.clone_url,
        git_ref: GitRef::new(raw.git_ref),
        ref_type: RefType::from(raw.ref_type.as_str()),
    })
}
