//! Build report endpoint.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use super::AppState;

/// Returns every finished build, one JSON object per line, in completion
/// order.
pub async fn report_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        app_state.ledger().render(),
    )
}
