//! File server endpoints.
//!
//! `/create-server`, `/delete-server`, `/toggle-livereload` and the
//! `/api/servers` listing.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::record::ServerRecord;
use crate::registry::Manager;

/// Form body for POST /create-server.
#[derive(Deserialize)]
pub(crate) struct CreateServerForm {
    root_path: PathBuf,
}

/// Query for GET /delete-server.
#[derive(Deserialize)]
pub(crate) struct DeleteServerQuery {
    id: u64,
}

/// Response for GET /api/servers.
#[derive(Serialize)]
pub(crate) struct ServersResponse {
    live_reload: bool,
    servers: Vec<ServerRecord>,
}

/// Render an extractor rejection as a JSON error.
fn rejection_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

/// 302 back to the status page.
fn redirect_home() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}

/// Handle POST /create-server.
pub(crate) async fn create_server(
    State(manager): State<Arc<Manager>>,
    form: Result<Form<CreateServerForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => return rejection_response(rejection.status(), rejection.body_text()),
    };

    match manager.add_server(&form.root_path).await {
        Ok((record, _)) => Json(record).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handle GET /delete-server.
pub(crate) async fn delete_server(
    State(manager): State<Arc<Manager>>,
    query: Result<Query<DeleteServerQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return rejection_response(rejection.status(), rejection.body_text()),
    };

    match manager.delete_server(query.id).await {
        Ok(_) => redirect_home(),
        Err(e) => e.into_response(),
    }
}

/// Handle GET or POST /toggle-livereload.
pub(crate) async fn toggle_live_reload(State(manager): State<Arc<Manager>>) -> Response {
    manager.toggle_live_reload().await;
    redirect_home()
}

/// Handle GET /api/servers.
pub(crate) async fn list_servers(State(manager): State<Arc<Manager>>) -> Json<ServersResponse> {
    Json(ServersResponse {
        live_reload: manager.live_reload_enabled(),
        servers: manager.servers().await,
    })
}
