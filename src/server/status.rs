//! Status banner.
//!
//! `GET /` answers with the daemon name and version so a browser or a load
//! balancer can tell the hook endpoint is alive. With `?debug=true` the
//! response also echoes the request line and headers, which helps when
//! checking what a reverse proxy forwards.

use std::fmt::Write;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, Uri};
use serde::Deserialize;

use super::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct BannerQuery {
    debug: Option<String>,
}

impl BannerQuery {
    fn debug(&self) -> bool {
        self.debug
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// Banner handler.
pub async fn status_handler(
    State(app_state): State<AppState>,
    Query(query): Query<BannerQuery>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> String {
    let mut body = format!(
        "MicroCI {}\nListening for GitHub hooks on /github\n",
        app_state.version()
    );

    if query.debug() {
        let _ = writeln!(body, "\nRequest:\n{method} {uri}");
        for (name, value) in &headers {
            let _ = writeln!(body, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
    }

    body
}
