//! Container engine boundary.
//!
//! The build pipeline talks to Docker only through [`ContainerEngine`]. The
//! production implementation is [`DockerEngine`] (bollard); tests use an
//! in-memory fake. Build and push output is exposed as an [`OutputStream`]
//! that the notification layer drains.

mod docker;
mod error;
mod output;
mod registry;

pub use docker::{DockerConnection, DockerEngine, TlsMaterial};
pub use error::EngineError;
pub use output::{OutputLine, OutputStream, decode_lines};

use async_trait::async_trait;

use crate::types::ImageRef;

/// Build an image from a remote git context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Remote context understood by `docker build`, `<clone url>#<ref>`.
    pub remote_context: String,
    /// Tag given to the built image.
    pub image: ImageRef,
}

/// Registry credentials supplied at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    /// Registry host; Docker Hub when `None`.
    pub server_address: Option<String>,
}

impl RegistryCredentials {
    /// Returns credentials only when both user and password are non-empty.
    pub fn from_parts(
        username: Option<String>,
        password: Option<String>,
        server_address: Option<String>,
    ) -> Option<Self> {
        let username = username.filter(|u| !u.is_empty())?;
        let password = password.filter(|p| !p.is_empty())?;
        Some(RegistryCredentials {
            username,
            password,
            server_address: server_address.filter(|s| !s.is_empty()),
        })
    }

    /// Registry name for log output.
    pub fn registry(&self) -> &str {
        self.server_address.as_deref().unwrap_or("docker.io")
    }
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("server_address", &self.server_address)
            .finish_non_exhaustive()
    }
}

/// Operations the build pipeline needs from a container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Checks `credentials` against the registry. A refusal is
    /// [`EngineError::LoginRejected`].
    async fn registry_login(&self, credentials: &RegistryCredentials) -> Result<(), EngineError>;

    /// Starts a build and returns its live output.
    ///
    /// Fails only if the build request itself cannot be made; a Dockerfile
    /// that fails to build still yields `Ok` with the failure in the output.
    async fn build_image(&self, request: &BuildRequest) -> Result<OutputStream, EngineError>;

    /// Adds `target` as an additional tag of the local image `source`.
    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), EngineError>;

    /// Starts pushing `image` and returns its live output.
    async fn push_image(
        &self,
        image: &ImageRef,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<OutputStream, EngineError>;

    /// Returns the daemon's system information as JSON.
    async fn info(&self) -> Result<String, EngineError>;
}
