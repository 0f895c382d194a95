//! Registry credential check against the distribution API.
//!
//! The daemon only forwards credentials when it pushes, so a wrong password
//! would otherwise surface in the middle of the first push. Logging in walks
//! the registry's `/v2/` auth challenge instead: `Basic` registries are asked
//! again with the credentials, `Bearer` registries (Docker Hub) are asked for
//! a token from their realm.

use std::time::Duration;

use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{EngineError, RegistryCredentials};

const DOCKER_HUB_REGISTRY: &str = "https://registry-1.docker.io";

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Authentication scheme a registry asks for on `/v2/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
    },
}

/// Parses a `WWW-Authenticate` header. Unknown schemes and bearer
/// challenges without a realm yield `None`.
pub(crate) fn parse_challenge(header: &str) -> Option<Challenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut realm = None;
    let mut service = None;
    for param in params.split(',') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            _ => {}
        }
    }
    Some(Challenge::Bearer {
        realm: realm?,
        service,
    })
}

/// Base URL of the registry API for a configured server address.
pub(crate) fn registry_base(server_address: Option<&str>) -> String {
    let Some(address) = server_address.map(str::trim).filter(|a| !a.is_empty()) else {
        return DOCKER_HUB_REGISTRY.to_string();
    };
    if address.contains("index.docker.io") || address == "docker.io" {
        return DOCKER_HUB_REGISTRY.to_string();
    }
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("https://{address}")
    }
}

/// HTTP client used to verify registry credentials.
#[derive(Debug, Clone)]
pub(crate) struct RegistryLogin {
    client: Client,
}

impl RegistryLogin {
    pub(crate) fn new() -> Result<Self, EngineError> {
        let client = Client::builder()
            .user_agent("microci")
            .timeout(REGISTRY_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Fails with [`EngineError::LoginRejected`] when the registry refuses
    /// the credentials.
    pub(crate) async fn verify(&self, credentials: &RegistryCredentials) -> Result<(), EngineError> {
        let base = registry_base(credentials.server_address.as_deref());
        let probe = self.client.get(format!("{base}/v2/")).send().await?;

        let challenge = match probe.status() {
            status if status.is_success() => {
                debug!(registry = %base, "Registry does not require authentication");
                return Ok(());
            }
            StatusCode::UNAUTHORIZED => probe
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_challenge)
                .ok_or_else(|| rejected(credentials, "registry sent no usable auth challenge"))?,
            status => return Err(rejected(credentials, status)),
        };

        let request = match &challenge {
            Challenge::Basic => self.client.get(format!("{base}/v2/")),
            Challenge::Bearer { realm, service } => {
                let mut query = vec![("account", credentials.username.as_str())];
                if let Some(service) = service {
                    query.push(("service", service.as_str()));
                }
                self.client.get(realm).query(&query)
            }
        };
        let response = request
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(rejected(credentials, status)),
        }
    }
}

fn rejected(credentials: &RegistryCredentials, reason: impl ToString) -> EngineError {
    EngineError::LoginRejected {
        registry: credentials.registry().to_string(),
        reason: reason.to_string(),
    }
}
