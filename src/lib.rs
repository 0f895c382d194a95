//! microci - a minimalistic CI daemon for Docker.
//!
//! Receives GitHub `push` and `create` webhooks, builds a Docker image from the
//! referenced git ref, pushes it to a registry and reports progress to the
//! console or Slack, plus optional GitHub commit statuses.

pub mod build;
pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod github;
pub mod notify;
pub mod report;
pub mod server;
pub mod shutdown;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod test_utils;
