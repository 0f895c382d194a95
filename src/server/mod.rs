//! HTTP server for the CI daemon.
//!
//! # Endpoints
//!
//! - `POST /github`, `POST /microci/github` - GitHub webhook deliveries (202 Accepted)
//! - `GET /`, `GET /microci/` - status banner, `?debug=true` adds a request dump
//! - `GET /report`, `GET /microci/report` - finished builds as NDJSON
//! - `GET /health` - returns 200 if the server is running

use std::sync::Arc;

pub mod health;
pub mod report;
pub mod status;
pub mod webhook;

pub use health::health_handler;
pub use report::report_handler;
pub use status::status_handler;
pub use webhook::{WebhookError, webhook_handler};

use crate::dispatch::EventDispatcher;
use crate::report::StatsLedger;

/// Shared application state.
///
/// Passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Webhook secret for HMAC-SHA256 signature verification. Empty disables
    /// verification.
    webhook_secret: Vec<u8>,

    dispatcher: EventDispatcher,

    ledger: Arc<StatsLedger>,

    /// Version string shown on the status banner.
    version: String,
}

impl AppState {
    pub fn new(
        webhook_secret: impl Into<Vec<u8>>,
        dispatcher: EventDispatcher,
        ledger: Arc<StatsLedger>,
        version: impl Into<String>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                webhook_secret: webhook_secret.into(),
                dispatcher,
                ledger,
                version: version.into(),
            }),
        }
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn ledger(&self) -> &StatsLedger {
        &self.inner.ledger
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/", get(status_handler))
        .route("/microci/", get(status_handler))
        .route("/github", post(webhook_handler))
        .route("/microci/github", post(webhook_handler))
        .route("/report", get(report_handler))
        .route("/microci/report", get(report_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
