//! GitHub webhook event types.
//!
//! Only the two events that can trigger a build are modelled:
//!
//! - `push` - commits pushed to a branch or tag
//! - `create` - a branch or tag was created

use serde::{Deserialize, Serialize};

use crate::types::{GitRef, RepoId};

/// A parsed GitHub webhook event.
///
/// Unknown or irrelevant events are represented by returning `None` from the
/// parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    Push(PushEvent),
    Create(CreateEvent),
}

impl WebhookEvent {
    /// Returns the repository this event belongs to.
    pub fn repo_id(&self) -> &RepoId {
        match self {
            WebhookEvent::Push(e) => &e.repo,
            WebhookEvent::Create(e) => &e.repo,
        }
    }

    /// The `X-GitHub-Event` name this event was delivered as.
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::Push(_) => "push",
            WebhookEvent::Create(_) => "create",
        }
    }
}

/// Commits pushed to a ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub repo: RepoId,

    /// HTTPS clone URL of the repository.
    pub clone_url: String,

    /// Full ref that was pushed, e.g. `refs/heads/main`.
    pub git_ref: GitRef,

    /// SHA of the head commit after the push.
    ///
    /// `None` when the push deleted the ref.
    pub head_commit: Option<String>,

    /// Whether the push deleted the ref.
    pub deleted: bool,
}

/// Kind of ref a `create` event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    Branch,
    Tag,
    /// Anything else GitHub may report (historically `repository`).
    Other(String),
}

impl RefType {
    /// Branches and tags are buildable; everything else is ignored.
    pub fn is_buildable(&self) -> bool {
        matches!(self, RefType::Branch | RefType::Tag)
    }
}

impl From<&str> for RefType {
    fn from(s: &str) -> Self {
        match s {
            "branch" => RefType::Branch,
            "tag" => RefType::Tag,
            other => RefType::Other(other.to_string()),
        }
    }
}

/// A branch or tag was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEvent {
    pub repo: RepoId,

    /// HTTPS clone URL of the repository.
    pub clone_url: String,

    /// Short name of the created branch or tag, e.g. `release-1.0`.
    pub git_ref: GitRef,

    pub ref_type: RefType,
}
