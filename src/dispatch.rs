//! Turns webhook events into build tasks.
//!
//! Each qualifying event gets a fresh cancellation token, registered in the
//! [`CancelRegistry`] before its build task is spawned. The dispatcher never
//! waits for the build: the webhook handler returns as soon as the task is
//! launched. Duplicate deliveries start duplicate builds.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument};

use crate::build::{BuildCoordinator, BuildError, BuildParams};
use crate::cancel::CancelRegistry;
use crate::types::GitRef;
use crate::webhooks::WebhookEvent;

/// Launches one build per qualifying event.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    coordinator: Arc<BuildCoordinator>,
    registry: Arc<CancelRegistry>,
}

impl EventDispatcher {
    pub fn new(coordinator: Arc<BuildCoordinator>, registry: Arc<CancelRegistry>) -> Self {
        EventDispatcher {
            coordinator,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<CancelRegistry> {
        &self.registry
    }

    /// Maps an event to the build it should trigger, if any.
    ///
    /// - push: the ref's last path segment is built and the head commit is the
    ///   tag. Ref deletions and pushes without a head commit build nothing.
    /// - create: branches and tags only; the ref doubles as the tag.
    pub fn build_params(event: &WebhookEvent) -> Option<BuildParams> {
        match event {
            WebhookEvent::Push(push) => {
                if push.deleted {
                    return None;
                }
                let head = push.head_commit.clone()?;
                Some(BuildParams {
                    clone_url: push.clone_url.clone(),
                    git_ref: GitRef::new(push.git_ref.short_name()),
                    repo: push.repo.clone(),
                    tag: head,
                })
            }
            WebhookEvent::Create(create) => {
                if !create.ref_type.is_buildable() {
                    return None;
                }
                Some(BuildParams {
                    clone_url: create.clone_url.clone(),
                    git_ref: create.git_ref.clone(),
                    repo: create.repo.clone(),
                    tag: create.git_ref.to_string(),
                })
            }
        }
    }

    /// Spawns the build for `event` and returns its handle, or `None` when
    /// the event does not trigger a build.
    #[instrument(skip_all, fields(event = event.kind(), repo = %event.repo_id()))]
    pub fn dispatch(&self, event: &WebhookEvent) -> Option<JoinHandle<()>> {
        let Some(params) = Self::build_params(event) else {
            debug!("Event does not trigger a build");
            return None;
        };

        let token = CancellationToken::new();
        self.registry.append(token.clone());

        info!(git_ref = %params.git_ref, tag = %params.tag, "Dispatching build");

        let coordinator = Arc::clone(&self.coordinator);
        let span = info_span!("build_task", repo = %params.repo, tag = %params.tag);
        Some(tokio::spawn(
            async move {
                match coordinator.build_and_push(token, params).await {
                    Ok(status) => info!(status = %status, "Build task finished"),
                    Err(BuildError::Cancelled) => info!("Build task cancelled"),
                    Err(e) => error!(error = %e, "Build task failed"),
                }
            }
            .instrument(span),
        ))
    }
}
