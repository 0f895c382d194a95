//! Build reports and the in-memory ledger of finished builds.
//!
//! A [`BuildStatusReport`] is created when a build starts, mutated while its
//! output is streamed, and moved into the [`StatsLedger`] once the build is
//! classified. Status transitions are synchronous; publishing a transition to
//! GitHub is a separate, explicit step ([`BuildStatusReport::publish_status`]).
//! Publishes of one report reach the sink in transition order.

mod ledger;
mod status;

pub use ledger::StatsLedger;
pub use status::BuildStatus;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::github::CommitStatusSink;
use crate::types::RepoId;

/// Completion of one commit-status update. Resolves after every earlier
/// update of the same report.
pub type StatusPublish = Shared<BoxFuture<'static, ()>>;

/// Identity, timing and status of one build.
#[derive(Clone, Serialize)]
pub struct BuildStatusReport {
    pub repo_name: String,
    pub owner: String,
    pub image_name: String,
    /// Commit SHA for pushes, branch or tag name for create events.
    pub tag: String,
    /// Remote build context, `<clone url>#<ref>`.
    pub build_context: String,
    pub start: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    duration: Option<Duration>,
    status: BuildStatus,
    #[serde(skip)]
    started: Instant,
    #[serde(skip)]
    status_sink: Option<Arc<dyn CommitStatusSink>>,
    #[serde(skip)]
    last_publish: Option<StatusPublish>,
}

impl BuildStatusReport {
    /// Creates a report in the `Unknown` state, starting the clock now.
    pub fn new(
        repo: &RepoId,
        image_name: impl Into<String>,
        tag: impl Into<String>,
        build_context: impl Into<String>,
    ) -> Self {
        BuildStatusReport {
            repo_name: repo.repo.clone(),
            owner: repo.owner.clone(),
            image_name: image_name.into(),
            tag: tag.into(),
            build_context: build_context.into(),
            start: Utc::now(),
            duration: None,
            status: BuildStatus::Unknown,
            started: Instant::now(),
            status_sink: None,
            last_publish: None,
        }
    }

    /// Attaches the sink that status transitions are published to.
    pub fn with_status_sink(mut self, sink: Option<Arc<dyn CommitStatusSink>>) -> Self {
        self.status_sink = sink;
        self
    }

    pub fn repo_id(&self) -> RepoId {
        RepoId::new(&self.owner, &self.repo_name)
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    /// Wall-clock build duration, set by [`finish`](Self::finish).
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Moves to `next` if the state machine allows it and returns the
    /// resulting status. Illegal transitions leave the status unchanged.
    pub fn set_status(&mut self, next: BuildStatus) -> BuildStatus {
        if self.status.can_transition_to(next) {
            self.status = next;
        } else if self.status != next {
            debug!(
                from = %self.status,
                to = %next,
                tag = %self.tag,
                "Ignoring illegal status transition"
            );
        }
        self.status
    }

    /// Publishes the current status to the commit-status sink, if any.
    ///
    /// The update runs on its own task and never blocks the build; it waits
    /// for the report's previous update so the commit ends on the latest
    /// status. Failures are logged and dropped.
    pub fn publish_status(&mut self) -> Option<StatusPublish> {
        let sink = self.status_sink.clone()?;
        let repo = self.repo_id();
        let sha = self.tag.clone();
        let status = self.status;
        let previous = self.last_publish.take();

        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.await;
            }
            if let Err(e) = sink.update_status(&repo, &sha, status).await {
                warn!(
                    repo = %repo,
                    sha = %sha,
                    status = %status,
                    error = %e,
                    "Failed to update commit status"
                );
            }
        });
        let publish = async move {
            let _ = task.await;
        }
        .boxed()
        .shared();
        self.last_publish = Some(publish.clone());
        Some(publish)
    }

    /// Resolves once every status published so far has been delivered.
    pub fn published(&self) -> impl std::future::Future<Output = ()> + use<> {
        let last = self.last_publish.clone();
        async move {
            if let Some(last) = last {
                last.await;
            }
        }
    }

    /// Applies a transition and publishes it when the status changed.
    pub fn advance(&mut self, next: BuildStatus) -> BuildStatus {
        let before = self.status;
        let after = self.set_status(next);
        if after != before {
            self.publish_status();
        }
        after
    }

    /// Records the elapsed time since the report was created. Only the first
    /// call has an effect.
    pub fn finish(&mut self) -> Duration {
        *self.duration.get_or_insert_with(|| self.started.elapsed())
    }
}

impl std::fmt::Debug for BuildStatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildStatusReport")
            .field("owner", &self.owner)
            .field("repo_name", &self.repo_name)
            .field("image_name", &self.image_name)
            .field("tag", &self.tag)
            .field("build_context", &self.build_context)
            .field("start", &self.start)
            .field("duration", &self.duration)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

fn serialize_millis<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingStatusSink;

    fn report() -> BuildStatusReport {
        BuildStatusReport::new(
            &RepoId::new("acme", "widgets"),
            "acme/widgets",
            "abc123",
            "https://github.com/acme/widgets.git#main",
        )
    }

    #[test]
    fn new_report_is_unknown_and_unfinished() {
        let report = report();
        assert_eq!(report.status(), BuildStatus::Unknown);
        assert!(report.duration().is_none());
        assert_eq!(report.repo_id(), RepoId::new("acme", "widgets"));
    }

    #[test]
    fn set_status_follows_state_machine() {
        let mut report = report();
        assert_eq!(report.set_status(BuildStatus::Running), BuildStatus::Running);
        assert_eq!(report.set_status(BuildStatus::Passed), BuildStatus::Passed);
        // End-of-stream Failed must not clobber Passed.
        assert_eq!(report.set_status(BuildStatus::Failed), BuildStatus::Passed);
        assert_eq!(report.set_status(BuildStatus::Error), BuildStatus::Error);
    }

    #[test]
    fn finish_sets_duration_once() {
        let mut report = report();
        let first = report.finish();
        std::thread::sleep(Duration::from_millis(5));
        let second = report.finish();
        assert_eq!(first, second);
        assert_eq!(report.duration(), Some(first));
    }

    #[test]
    fn serializes_without_sink_and_with_millis() {
        let mut report = report();
        report.set_status(BuildStatus::Running);
        report.set_status(BuildStatus::Failed);
        report.duration = Some(Duration::from_millis(1500));

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["owner"], "acme");
        assert_eq!(json["repo_name"], "widgets");
        assert_eq!(json["status"], "Failed");
        assert_eq!(json["duration_ms"], 1500);
        assert!(json.get("status_sink").is_none());
        assert!(json.get("started").is_none());
    }

    #[test]
    fn publish_without_sink_is_noop() {
        assert!(report().publish_status().is_none());
    }

    #[tokio::test]
    async fn publish_sends_owner_repo_tag_and_status() {
        let sink = Arc::new(RecordingStatusSink::default());
        let mut report = report().with_status_sink(Some(sink.clone()));

        report.set_status(BuildStatus::Running);
        report.publish_status().unwrap().await;

        let updates = sink.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, RepoId::new("acme", "widgets"));
        assert_eq!(updates[0].1, "abc123");
        assert_eq!(updates[0].2, BuildStatus::Running);
    }

    #[tokio::test]
    async fn failing_sink_does_not_propagate() {
        let sink = Arc::new(RecordingStatusSink::failing());
        let mut report = report().with_status_sink(Some(sink.clone()));

        report.set_status(BuildStatus::Running);
        report.publish_status().unwrap().await;

        assert_eq!(report.status(), BuildStatus::Running);
        assert_eq!(sink.updates().len(), 1);
    }

    #[tokio::test]
    async fn advance_publishes_only_on_change() {
        let sink = Arc::new(RecordingStatusSink::default());
        let mut report = report().with_status_sink(Some(sink.clone()));

        report.advance(BuildStatus::Running);
        report.advance(BuildStatus::Passed);
        report.advance(BuildStatus::Passed);
        report.advance(BuildStatus::Failed);
        report.published().await;

        let statuses: Vec<_> = sink.updates().into_iter().map(|u| u.2).collect();
        assert_eq!(statuses, vec![BuildStatus::Running, BuildStatus::Passed]);
    }

    #[tokio::test]
    async fn slow_update_does_not_overtake_later_status() {
        let sink = Arc::new(RecordingStatusSink::slow(
            BuildStatus::Running,
            Duration::from_millis(50),
        ));
        let mut report = report().with_status_sink(Some(sink.clone()));

        report.advance(BuildStatus::Running);
        report.advance(BuildStatus::Passed);
        report.published().await;

        let statuses: Vec<_> = sink.updates().into_iter().map(|u| u.2).collect();
        assert_eq!(statuses, vec![BuildStatus::Running, BuildStatus::Passed]);
    }

    #[tokio::test]
    async fn published_without_updates_resolves() {
        report().published().await;
    }
}
