//! Control router construction.
//!
//! Builds the manager's axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::live_reload;
use crate::middleware::headers;
use crate::registry::Manager;

/// Create the control router.
pub(crate) fn create_router(manager: Arc<Manager>) -> Router {
    let api_routes = Router::new()
        .route("/create-server", post(handlers::servers::create_server))
        .route("/delete-server", get(handlers::servers::delete_server))
        .route(
            "/toggle-livereload",
            get(handlers::servers::toggle_live_reload).post(handlers::servers::toggle_live_reload),
        )
        .route("/api/servers", get(handlers::servers::list_servers));

    Router::new()
        .merge(api_routes)
        .route("/", get(handlers::status::status_page))
        .route("/livereload.js", get(handlers::assets::livereload_js))
        .route("/livereload", get(live_reload::ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(headers::no_cache_layer())
                .layer(headers::content_type_options_layer()),
        )
        .with_state(manager)
}
