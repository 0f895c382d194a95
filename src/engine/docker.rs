//! Docker engine backed by bollard.

use std::path::PathBuf;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::image::{BuildImageOptions, PushImageOptions, TagImageOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt, stream};
use tracing::{debug, info};

use super::registry::RegistryLogin;
use super::{
    BuildRequest, ContainerEngine, EngineError, OutputLine, OutputStream, RegistryCredentials,
};
use crate::types::ImageRef;

/// Seconds before a request to the daemon times out. Builds can run long.
const DOCKER_TIMEOUT_SECS: u64 = 3600;

/// Output records buffered between the daemon reader and the consumer.
const OUTPUT_BUFFER: usize = 64;

/// Client certificate material for a TLS-protected daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// How to reach the Docker daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DockerConnection {
    /// `unix:///var/run/docker.sock`, `tcp://host:2376`, or `None` for the
    /// local defaults (`DOCKER_HOST` or the standard socket).
    pub host: Option<String>,
    pub tls: Option<TlsMaterial>,
}

/// [`ContainerEngine`] that talks to a Docker daemon.
#[derive(Clone)]
pub struct DockerEngine {
    client: Docker,
    registry: RegistryLogin,
}

impl DockerEngine {
    pub fn new(client: Docker) -> Result<Self, EngineError> {
        Ok(Self {
            client,
            registry: RegistryLogin::new()?,
        })
    }

    /// Connects to the daemon described by `connection`.
    ///
    /// Connecting is lazy; nothing is sent to the daemon until the first call.
    pub fn connect(connection: &DockerConnection) -> Result<Self, EngineError> {
        let client = match (&connection.host, &connection.tls) {
            (None, _) => Docker::connect_with_local_defaults()?,
            (Some(host), _) if host.starts_with("unix://") => {
                Docker::connect_with_socket(host, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            (Some(host), Some(tls)) => Docker::connect_with_ssl(
                host,
                &tls.key,
                &tls.cert,
                &tls.ca,
                DOCKER_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )?,
            (Some(host), None) => {
                Docker::connect_with_http(host, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
        };
        Self::new(client)
    }

    /// Returns the underlying bollard client.
    pub fn client(&self) -> &Docker {
        &self.client
    }
}

impl std::fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerEngine").finish_non_exhaustive()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn registry_login(&self, credentials: &RegistryCredentials) -> Result<(), EngineError> {
        // Pushes still carry the credentials in X-Registry-Auth; this only
        // proves they are accepted before the first build starts.
        self.client.ping().await?;
        self.registry.verify(credentials).await?;
        info!(
            registry = credentials.registry(),
            username = %credentials.username,
            "Logged in to registry"
        );
        Ok(())
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<OutputStream, EngineError> {
        let options = BuildImageOptions {
            remote: request.remote_context.clone(),
            t: request.image.to_string(),
            forcerm: true,
            ..Default::default()
        };
        debug!(
            remote = %request.remote_context,
            image = %request.image,
            "Building Docker image"
        );

        let docker = self.client.clone();
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        tokio::spawn(async move {
            let output = docker.build_image(options, None, None);
            pump(output, tx).await;
        });

        open_stream(rx, request.image.to_string()).await
    }

    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), EngineError> {
        let options = TagImageOptions {
            repo: target.name.clone(),
            tag: target.tag.clone(),
        };
        self.client
            .tag_image(&source.to_string(), Some(options))
            .await?;
        debug!(source = %source, target = %target, "Tagged image");
        Ok(())
    }

    async fn push_image(
        &self,
        image: &ImageRef,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<OutputStream, EngineError> {
        let options = PushImageOptions {
            tag: image.tag.clone(),
        };
        let credentials = credentials.map(|c| DockerCredentials {
            username: Some(c.username.clone()),
            password: Some(c.password.clone()),
            serveraddress: c.server_address.clone(),
            ..Default::default()
        });

        let docker = self.client.clone();
        let name = image.name.clone();
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        tokio::spawn(async move {
            let output = docker.push_image(&name, Some(options), credentials);
            pump(output, tx).await;
        });

        open_stream(rx, image.to_string()).await
    }

    async fn info(&self) -> Result<String, EngineError> {
        let info = self.client.info().await?;
        Ok(serde_json::to_string(&info)?)
    }
}

/// Forwards daemon output into the channel until either side finishes.
///
/// bollard turns `{"error": ...}` records into `DockerStreamError`; those are
/// forwarded as output so a failing Dockerfile reads as a failed build rather
/// than a broken stream.
///
/// When the receiver is dropped (the build was cancelled) the daemon stream is
/// dropped too, which aborts the underlying HTTP request.
async fn pump<S, T>(output: S, mut tx: mpsc::Sender<Result<OutputLine, EngineError>>)
where
    S: Stream<Item = Result<T, bollard::errors::Error>>,
    T: Into<OutputLine>,
{
    futures::pin_mut!(output);
    while let Some(item) = output.next().await {
        let item = match item {
            Ok(info) => Ok(info.into()),
            Err(bollard::errors::Error::DockerStreamError { error, .. }) => {
                Ok(OutputLine::error(error))
            }
            Err(e) => Err(EngineError::from(e)),
        };
        if tx.send(item).await.is_err() {
            debug!("Output receiver dropped, aborting daemon request");
            break;
        }
    }
}

/// Waits for the first record so that a request the daemon refuses surfaces
/// as an error rather than as stream content.
async fn open_stream(
    mut rx: mpsc::Receiver<Result<OutputLine, EngineError>>,
    what: String,
) -> Result<OutputStream, EngineError> {
    match rx.next().await {
        Some(Ok(first)) => Ok(stream::once(async move { Ok(first) }).chain(rx).boxed()),
        Some(Err(e)) => Err(e),
        None => Err(EngineError::EmptyResponse(what)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::scan_build;
    use crate::report::BuildStatus;
    use crate::test_utils::sample_report;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn open_stream_returns_first_error() {
        let (mut tx, rx) = mpsc::channel(4);
        tx.send(Err(EngineError::EmptyResponse("x".into())))
            .await
            .unwrap();
        drop(tx);

        assert!(open_stream(rx, "img".into()).await.is_err());
    }

    #[tokio::test]
    async fn open_stream_keeps_first_record() {
        let (mut tx, rx) = mpsc::channel(4);
        tx.send(Ok(OutputLine::stream("one"))).await.unwrap();
        tx.send(Ok(OutputLine::stream("two"))).await.unwrap();
        drop(tx);

        let lines: Vec<_> = open_stream(rx, "img".into())
            .await
            .unwrap()
            .map(|l| l.unwrap().text())
            .collect()
            .await;
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn open_stream_on_closed_channel_is_empty_response() {
        let (tx, rx) = mpsc::channel::<Result<OutputLine, EngineError>>(1);
        drop(tx);

        let result = open_stream(rx, "acme/widgets:main".into()).await;
        assert!(matches!(result, Err(EngineError::EmptyResponse(what)) if what == "acme/widgets:main"));
    }

    #[tokio::test]
    async fn pump_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let output = stream::iter(
            (0..10).map(|i| Ok::<_, bollard::errors::Error>(OutputLine::stream(i.to_string()))),
        );
        // Must return instead of blocking on a full channel.
        pump(output, tx).await;
    }

    async fn pumped(
        items: Vec<Result<bollard::models::BuildInfo, bollard::errors::Error>>,
    ) -> OutputStream {
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        pump(stream::iter(items), tx).await;
        open_stream(rx, "acme/widgets:main".into()).await.unwrap()
    }

    fn build_info(text: &str) -> bollard::models::BuildInfo {
        bollard::models::BuildInfo {
            stream: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn daemon_error_record_classifies_as_failed_build() {
        let output = pumped(vec![
            Ok(build_info("Step 1/2 : RUN false\n")),
            Err(bollard::errors::Error::DockerStreamError {
                error: "The command '/bin/sh -c false' returned a non-zero code: 1".into(),
            }),
        ])
        .await;

        let mut report = sample_report();
        let mut rendered = String::new();
        let status = scan_build(&CancellationToken::new(), output, &mut report, |text| {
            rendered.push_str(text)
        })
        .await;

        assert_eq!(status, BuildStatus::Failed);
        assert!(rendered.ends_with("returned a non-zero code: 1\n"));
    }

    #[tokio::test]
    async fn daemon_success_still_passes() {
        let output = pumped(vec![
            Ok(build_info("Step 1/1 : FROM alpine\n")),
            Ok(build_info("Successfully built 0123456789ab\n")),
        ])
        .await;

        let mut report = sample_report();
        let status = scan_build(&CancellationToken::new(), output, &mut report, |_| {}).await;
        assert_eq!(status, BuildStatus::Passed);
    }

    #[tokio::test]
    async fn first_record_error_still_opens_stream() {
        let output = pumped(vec![Err(bollard::errors::Error::DockerStreamError {
            error: "unauthorized: authentication required".into(),
        })])
        .await;

        let lines: Vec<_> = output.collect().await;
        assert_eq!(
            lines[0].as_ref().unwrap().error.as_deref(),
            Some("unauthorized: authentication required")
        );
    }

    #[test]
    fn default_connection_uses_local_defaults() {
        let connection = DockerConnection::default();
        assert!(connection.host.is_none());
        assert!(connection.tls.is_none());
    }
}
