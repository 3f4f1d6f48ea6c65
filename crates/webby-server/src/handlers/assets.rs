//! Embedded live reload client.

use axum::http::header;
use axum::response::IntoResponse;

/// Browser client for the live reload protocol.
const LIVERELOAD_JS: &str = include_str!("../../assets/livereload.js");

/// Handle GET /livereload.js.
pub(crate) async fn livereload_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        LIVERELOAD_JS,
    )
}
