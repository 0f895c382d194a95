//! Webhook endpoint handler.
//!
//! Accepts GitHub webhook deliveries, validates signatures, parses `push` and
//! `create` events and hands them to the dispatcher. The handler returns 202
//! Accepted as soon as the build task is spawned.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::webhooks::{ParseError, SIGNATURE_HEADER, parse_webhook, verify_signature};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ParseError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Headers:
///   - `X-GitHub-Event`: event type; only `push` and `create` trigger builds
///   - `X-Hub-Signature-256`: HMAC-SHA256 of the body, required when a
///     secret is configured
///   - `X-GitHub-Delivery`: optional, logged
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 202 Accepted: build dispatched, or event ignored
/// - 400 Bad Request: missing header or malformed payload
/// - 401 Unauthorized: invalid signature
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = get_header(&headers, HEADER_EVENT)?;
    let delivery_id = get_header(&headers, HEADER_DELIVERY).unwrap_or_default();

    debug!(
        delivery_id = %delivery_id,
        event_type = %event_type,
        "Received webhook"
    );

    // Verify before parsing.
    let secret = app_state.webhook_secret();
    if !secret.is_empty() {
        let signature_header = get_header(&headers, SIGNATURE_HEADER)?;
        if !verify_signature(&body, &signature_header, secret) {
            warn!(delivery_id = %delivery_id, "Invalid webhook signature");
            return Err(WebhookError::InvalidSignature);
        }
    }

    let Some(event) = parse_webhook(&event_type, &body).inspect_err(|e| {
        warn!(delivery_id = %delivery_id, event_type = %event_type, error = %e, "Malformed webhook payload");
    })?
    else {
        debug!(event_type = %event_type, "Ignoring webhook event");
        return Ok((StatusCode::ACCEPTED, "Ignored"));
    };

    info!(
        delivery_id = %delivery_id,
        event_type = %event_type,
        repo = %event.repo_id(),
        "Webhook accepted"
    );

    match app_state.dispatcher().dispatch(&event) {
        Some(_) => Ok((StatusCode::ACCEPTED, "Accepted")),
        None => Ok((StatusCode::ACCEPTED, "Ignored")),
    }
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}
