//! Command-line configuration.
//!
//! Every flag has an environment fallback so the daemon can be configured
//! entirely from a container's environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use thiserror::Error;

use crate::engine::{DockerConnection, RegistryCredentials, TlsMaterial};
use crate::types::ImageTarget;

/// Minimalistic CI daemon for Docker
#[derive(Parser, Debug)]
#[command(name = "microci", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug mode with verbose logging
    #[arg(
        long,
        global = true,
        env = "MICROCI_DEBUG",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub debug: bool,

    /// Produce logs in JSON format
    #[arg(
        long,
        global = true,
        env = "MICROCI_JSON",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub json: bool,

    /// Docker daemon socket to connect to
    #[arg(long, global = true, env = "DOCKER_HOST", value_name = "URL")]
    pub host: Option<String>,

    /// Use TLS and verify the daemon's certificate
    #[arg(
        long,
        global = true,
        env = "DOCKER_TLS_VERIFY",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub tls_verify: bool,

    /// Directory holding ca.pem, cert.pem and key.pem
    #[arg(long, global = true, env = "DOCKER_CERT_PATH", value_name = "DIR")]
    pub cert_path: Option<PathBuf>,

    /// Trust certs signed only by this CA
    #[arg(long, global = true, value_name = "FILE")]
    pub tls_ca: Option<PathBuf>,

    /// TLS client certificate
    #[arg(long, global = true, value_name = "FILE")]
    pub tls_cert: Option<PathBuf>,

    /// TLS client key
    #[arg(long, global = true, value_name = "FILE")]
    pub tls_key: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the webhook server
    Server(ServerArgs),

    /// Show Docker daemon info
    Info,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// GitHub webhook secret; empty disables signature checks
    #[arg(long, env = "MICROCI_SECRET", default_value = "", hide_env_values = true)]
    pub secret: String,

    /// IP the webhook should serve hooks on
    #[arg(long, env = "MICROCI_IP", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub ip: IpAddr,

    /// Port the webhook should serve hooks on
    #[arg(long, env = "MICROCI_PORT", default_value_t = 9000)]
    pub port: u16,

    /// Registry user
    #[arg(long, env = "REGISTRY_USER")]
    pub user: Option<String>,

    /// Registry password
    #[arg(long, env = "REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Registry host images are pushed to (Docker Hub when unset)
    #[arg(long, env = "REGISTRY")]
    pub registry: Option<String>,

    /// Namespace that replaces the GitHub owner in image names
    #[arg(long, env = "REGISTRY_REPOSITORY")]
    pub repository: Option<String>,

    /// Slack API token; enables Slack build reports
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true)]
    pub slack_token: Option<String>,

    /// Slack channel to post build results
    #[arg(long, env = "SLACK_CHANNEL", default_value = "#builds")]
    pub slack_channel: String,

    /// GitHub token; enables commit status updates
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Build only, never push
    #[arg(long)]
    pub no_push: bool,

    /// Do not render build output
    #[arg(long)]
    pub quiet: bool,
}

/// Configuration that cannot be expressed by clap's own validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--tls-verify needs --cert-path or all of --tls-ca, --tls-cert and --tls-key")]
    IncompleteTls,
}

impl Cli {
    /// How to reach the Docker daemon.
    pub fn docker_connection(&self) -> Result<DockerConnection, ConfigError> {
        let tls = if self.tls_verify {
            Some(self.tls_material()?)
        } else {
            None
        };
        Ok(DockerConnection {
            host: self.host.clone().filter(|h| !h.is_empty()),
            tls,
        })
    }

    fn tls_material(&self) -> Result<TlsMaterial, ConfigError> {
        let from_dir = |file: &str| self.cert_path.as_ref().map(|dir| dir.join(file));
        let ca = self.tls_ca.clone().or_else(|| from_dir("ca.pem"));
        let cert = self.tls_cert.clone().or_else(|| from_dir("cert.pem"));
        let key = self.tls_key.clone().or_else(|| from_dir("key.pem"));

        match (ca, cert, key) {
            (Some(ca), Some(cert), Some(key)) => Ok(TlsMaterial { ca, cert, key }),
            _ => Err(ConfigError::IncompleteTls),
        }
    }
}

impl ServerArgs {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn image_target(&self) -> ImageTarget {
        ImageTarget::new(self.registry.clone(), self.repository.clone())
    }

    /// Complete registry credentials, or `None` when either part is missing.
    pub fn registry_credentials(&self) -> Option<RegistryCredentials> {
        RegistryCredentials::from_parts(
            self.user.clone(),
            self.password.clone(),
            self.registry.clone(),
        )
    }

    /// Slack token, if one was given and is non-empty.
    pub fn slack_token(&self) -> Option<&str> {
        self.slack_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn github_token(&self) -> Option<&str> {
        self.github_token.as_deref().filter(|t| !t.is_empty())
    }
}
