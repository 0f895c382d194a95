//! Shared fakes for unit tests.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Json, Router, routing::post};
use futures::StreamExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::engine::{
    BuildRequest, ContainerEngine, EngineError, OutputStream, RegistryCredentials, decode_lines,
};
use crate::github::{CommitStatusSink, StatusError};
use crate::report::{BuildStatus, BuildStatusReport};
use crate::types::{ImageRef, RepoId};

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn poll_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

/// A report for `acme/widgets` at `abc123`, built from `main`.
pub fn sample_report() -> BuildStatusReport {
    BuildStatusReport::new(
        &RepoId::new("acme", "widgets"),
        "acme/widgets",
        "abc123",
        "https://github.com/acme/widgets.git#main",
    )
}

// ─── Container engine ───

/// A call observed by [`FakeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Login,
    Build(BuildRequest),
    Tag(ImageRef, ImageRef),
    /// Image pushed and whether credentials were attached.
    Push(ImageRef, bool),
}

/// In-memory [`ContainerEngine`] that replays canned NDJSON output.
#[derive(Debug, Default)]
pub struct FakeEngine {
    /// Build output, `None` for a build that never finishes.
    build_output: Option<String>,
    fail_login: bool,
    fail_build: bool,
    fail_push: bool,
    deny_push: bool,
    calls: Mutex<Vec<EngineCall>>,
    build_started: Notify,
}

impl FakeEngine {
    /// Builds emit `lines`, one NDJSON record each.
    pub fn passing(lines: &[&str]) -> Self {
        let mut output = lines.join("\n");
        output.push('\n');
        FakeEngine {
            build_output: Some(output),
            ..Default::default()
        }
    }

    /// Builds whose output stream stays open until cancelled.
    pub fn hanging() -> Self {
        FakeEngine::default()
    }

    pub fn fail_login(mut self) -> Self {
        self.fail_login = true;
        self
    }

    pub fn fail_build(mut self) -> Self {
        self.fail_build = true;
        self
    }

    pub fn fail_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// Pushes start but the registry refuses them with an error record.
    pub fn deny_push(mut self) -> Self {
        self.deny_push = true;
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn login_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::Login))
    }

    pub fn push_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::Push(..)))
    }

    /// Resolves once a build call has been made.
    pub async fn wait_for_build(&self) {
        self.build_started.notified().await;
    }

    fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn registry_login(&self, credentials: &RegistryCredentials) -> Result<(), EngineError> {
        self.record(EngineCall::Login);
        if self.fail_login {
            return Err(EngineError::LoginRejected {
                registry: credentials.registry().to_string(),
                reason: "unauthorized: incorrect username or password".into(),
            });
        }
        Ok(())
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<OutputStream, EngineError> {
        self.record(EngineCall::Build(request.clone()));
        self.build_started.notify_one();
        if self.fail_build {
            return Err(EngineError::EmptyResponse(request.image.to_string()));
        }
        Ok(match &self.build_output {
            Some(output) => decode_lines(io::Cursor::new(output.clone().into_bytes())),
            None => futures::stream::pending().boxed(),
        })
    }

    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), EngineError> {
        self.record(EngineCall::Tag(source.clone(), target.clone()));
        Ok(())
    }

    async fn push_image(
        &self,
        image: &ImageRef,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<OutputStream, EngineError> {
        self.record(EngineCall::Push(image.clone(), credentials.is_some()));
        if self.fail_push {
            return Err(EngineError::EmptyResponse(image.to_string()));
        }
        let mut output = format!(
            "{{\"status\":\"The push refers to repository [{}]\"}}\n",
            image.name
        );
        if self.deny_push {
            output.push_str(
                "{\"error\":\"denied: requested access to the resource is denied\"}\n",
            );
        } else {
            output.push_str(&format!(
                "{{\"status\":\"{}: digest: sha256:0000 size: 528\"}}\n",
                image.tag
            ));
        }
        Ok(decode_lines(io::Cursor::new(output.into_bytes())))
    }

    async fn info(&self) -> Result<String, EngineError> {
        Ok(r#"{"ServerVersion":"fake"}"#.to_string())
    }
}

// ─── Commit status ───

/// [`CommitStatusSink`] that records every update.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    updates: Mutex<Vec<(RepoId, String, BuildStatus)>>,
    fail: bool,
    /// Updates with this status are held back before being recorded.
    delay: Option<(BuildStatus, Duration)>,
}

impl RecordingStatusSink {
    /// Records updates, then rejects them.
    pub fn failing() -> Self {
        RecordingStatusSink {
            fail: true,
            ..Default::default()
        }
    }

    /// Records updates for `status` only after `delay`.
    pub fn slow(status: BuildStatus, delay: Duration) -> Self {
        RecordingStatusSink {
            delay: Some((status, delay)),
            ..Default::default()
        }
    }

    pub fn updates(&self) -> Vec<(RepoId, String, BuildStatus)> {
        self.updates.lock().unwrap().clone()
    }

    /// Waits until at least `n` updates arrived.
    pub async fn wait_for(&self, n: usize) {
        poll_until(|| self.updates.lock().unwrap().len() >= n).await;
    }
}

#[async_trait]
impl CommitStatusSink for RecordingStatusSink {
    async fn update_status(
        &self,
        repo: &RepoId,
        sha: &str,
        status: BuildStatus,
    ) -> Result<(), StatusError> {
        if let Some((slow, delay)) = self.delay {
            if slow == status {
                tokio::time::sleep(delay).await;
            }
        }
        self.updates
            .lock()
            .unwrap()
            .push((repo.clone(), sha.to_string(), status));
        if self.fail {
            return Err(StatusError::MissingSha);
        }
        Ok(())
    }
}

// ─── Console output ───

/// In-memory writer shared with a console sink.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn writer(&self) -> Arc<Mutex<dyn Write + Send>> {
        Arc::new(Mutex::new(self.clone()))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ─── Chat API ───

/// A request received by [`FakeChatApi`].
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

type Requests = Arc<Mutex<Vec<ChatRequest>>>;

/// Local HTTP server standing in for `chat.postMessage`.
pub struct FakeChatApi {
    addr: SocketAddr,
    requests: Requests,
    server: JoinHandle<()>,
}

impl FakeChatApi {
    /// Starts the server. With `ok == false` every post is answered with
    /// `channel_not_found`.
    pub async fn start(ok: bool) -> Self {
        let requests = Requests::default();
        let app = Router::new()
            .route("/api/chat.postMessage", post(post_message))
            .with_state((Arc::clone(&requests), ok));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakeChatApi {
            addr,
            requests,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/api/chat.postMessage", self.addr)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeChatApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn post_message(
    State((requests, ok)): State<(Requests, bool)>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    requests
        .lock()
        .unwrap()
        .push(ChatRequest {
            authorization,
            body: body.clone(),
        });

    if ok {
        Json(serde_json::json!({
            "ok": true,
            "channel": body["channel"],
            "ts": "1503435956.000247",
        }))
    } else {
        Json(serde_json::json!({ "ok": false, "error": "channel_not_found" }))
    }
}
