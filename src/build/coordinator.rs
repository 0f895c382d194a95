//! Runs a single build from remote git context to pushed image.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::BuildError;
use crate::engine::{BuildRequest, ContainerEngine, EngineError, RegistryCredentials};
use crate::github::CommitStatusSink;
use crate::notify::{BuildNotify, StreamEnd};
use crate::report::{BuildStatus, BuildStatusReport, StatsLedger};
use crate::types::{GitRef, ImageRef, ImageTarget, RepoId};

/// What to build, extracted from a webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParams {
    /// Repository clone URL.
    pub clone_url: String,
    /// Ref to build; for pushes already reduced to the branch/tag name.
    pub git_ref: GitRef,
    pub repo: RepoId,
    /// Explicit image tag: the head commit for pushes, the ref for creates.
    pub tag: String,
}

impl BuildParams {
    /// Remote build context, `<clone url>#<ref>`.
    pub fn remote_context(&self) -> String {
        format!("{}#{}", self.clone_url, self.git_ref)
    }
}

/// Orchestrates builds. One instance is shared by every build task.
pub struct BuildCoordinator {
    engine: Arc<dyn ContainerEngine>,
    notifier: Arc<dyn BuildNotify>,
    ledger: Arc<StatsLedger>,
    status_sink: Option<Arc<dyn CommitStatusSink>>,
    target: ImageTarget,
    credentials: Option<RegistryCredentials>,
    push: bool,
    login: OnceCell<()>,
}

impl BuildCoordinator {
    /// Creates a coordinator that pushes to Docker Hub without credentials.
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        notifier: Arc<dyn BuildNotify>,
        ledger: Arc<StatsLedger>,
    ) -> Self {
        BuildCoordinator {
            engine,
            notifier,
            ledger,
            status_sink: None,
            target: ImageTarget::default(),
            credentials: None,
            push: true,
            login: OnceCell::new(),
        }
    }

    /// Mirrors status transitions to commit statuses.
    pub fn with_status_sink(mut self, sink: Option<Arc<dyn CommitStatusSink>>) -> Self {
        self.status_sink = sink;
        self
    }

    pub fn with_target(mut self, target: ImageTarget) -> Self {
        self.target = target;
        self
    }

    /// Registry credentials; `None` pushes unauthenticated.
    pub fn with_credentials(mut self, credentials: Option<RegistryCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Enables or disables pushing after a successful build.
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Whether registry credentials were configured at startup.
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// Image references for a build: the ref's short name first, then the
    /// explicit tag unless the two are identical.
    pub fn image_tags(&self, params: &BuildParams) -> Vec<ImageRef> {
        let name = self.target.image_name(&params.repo);
        let ref_tag = params.git_ref.short_name();

        let mut tags = vec![ImageRef::new(name.clone(), ref_tag)];
        if params.tag != ref_tag {
            tags.push(ImageRef::new(name, params.tag.clone()));
        }
        tags
    }

    /// Builds the image for `params` and pushes its tags if the build passed.
    ///
    /// Returns the terminal build status. Errors are reserved for transport
    /// failures and cancellation while waiting on the engine; a failed
    /// Dockerfile yields `Ok(BuildStatus::Failed)`. Every call records exactly
    /// one report in the ledger, including calls that fail before the build
    /// starts.
    #[instrument(skip_all, fields(repo = %params.repo, git_ref = %params.git_ref, tag = %params.tag))]
    pub async fn build_and_push(
        &self,
        token: CancellationToken,
        params: BuildParams,
    ) -> Result<BuildStatus, BuildError> {
        let tags = self.image_tags(&params);
        let primary = tags[0].clone();

        let mut report = BuildStatusReport::new(
            &params.repo,
            primary.name.clone(),
            params.tag.clone(),
            params.remote_context(),
        )
        .with_status_sink(self.status_sink.clone());
        report.advance(BuildStatus::Running);

        if let Err(e) = self.ensure_login(&token).await {
            return Err(self.abort(report, e));
        }

        let request = BuildRequest {
            remote_context: params.remote_context(),
            image: primary.clone(),
        };
        info!(image = %primary, context = %request.remote_context, "Starting build");

        let output =
            match cancellable(&token, self.engine.build_image(&request), BuildError::Build).await {
                Ok(output) => output,
                Err(e) => return Err(self.abort(report, e)),
            };

        let status = self
            .notifier
            .send_build_report(&token, output, report)
            .await;
        info!(image = %primary, status = %status, "Build finished");

        if status != BuildStatus::Passed {
            return Ok(status);
        }

        for image in &tags[1..] {
            cancellable(&token, self.engine.tag_image(&primary, image), BuildError::Tag).await?;
        }

        if !self.push {
            return Ok(status);
        }

        for image in &tags {
            let push_error = |source: EngineError| BuildError::Push {
                image: image.to_string(),
                source,
            };
            let output = cancellable(
                &token,
                self.engine.push_image(image, self.credentials.as_ref()),
                push_error,
            )
            .await?;
            match self.notifier.send_push_report(&token, output, image).await {
                StreamEnd::Exhausted => info!(image = %image, "Pushed image"),
                StreamEnd::Failed(source) => return Err(push_error(source)),
                StreamEnd::Cancelled => return Err(BuildError::Cancelled),
            }
        }

        Ok(status)
    }

    /// Marks a report that never reached the notifier as `Error` and records
    /// it.
    fn abort(&self, mut report: BuildStatusReport, error: BuildError) -> BuildError {
        report.advance(BuildStatus::Error);
        report.finish();
        self.ledger.append(report);
        error
    }

    /// Logs in to the registry once per process, before the first build.
    /// A failed login is retried by the next build.
    async fn ensure_login(&self, token: &CancellationToken) -> Result<(), BuildError> {
        let Some(credentials) = &self.credentials else {
            return Ok(());
        };

        let login = self.login.get_or_try_init(|| async {
            info!(registry = credentials.registry(), "Logging in to registry");
            self.engine.registry_login(credentials).await
        });
        cancellable(token, login, BuildError::Login)
            .await
            .inspect_err(|e| warn!(error = %e, "Registry login failed"))?;
        Ok(())
    }
}

impl std::fmt::Debug for BuildCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildCoordinator")
            .field("target", &self.target)
            .field("authenticated", &self.is_authenticated())
            .field("push", &self.push)
            .finish_non_exhaustive()
    }
}

/// Awaits an engine call unless `token` fires first. Dropping the call
/// aborts the underlying request.
async fn cancellable<T>(
    token: &CancellationToken,
    call: impl Future<Output = Result<T, EngineError>>,
    wrap: impl FnOnce(EngineError) -> BuildError,
) -> Result<T, BuildError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(BuildError::Cancelled),
        result = call => result.map_err(wrap),
    }
}
