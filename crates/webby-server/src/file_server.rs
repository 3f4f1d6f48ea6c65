//! Per-root static file server.
//!
//! Each file server owns one listener and one serve task. HTML files are
//! served with the live reload script appended while live reload is enabled;
//! everything else goes through tower-http's `ServeDir`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::error::ServerError;
use crate::html;
use crate::middleware::headers;
use crate::record::ServerRecord;

/// Settings shared by every file server of a manager.
#[derive(Clone)]
pub(crate) struct FileServerContext {
    /// Host to bind to.
    pub host: String,
    /// Manager port, used in the injected script URL.
    pub manager_port: u16,
    /// Live reload flag, flipped by the manager.
    pub live_reload: Arc<AtomicBool>,
}

/// A running file server.
pub(crate) struct FileServer {
    record: ServerRecord,
    task: JoinHandle<()>,
}

impl FileServer {
    /// Bind the record's port and start serving its root.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ListenerBind`] if the port cannot be bound.
    pub(crate) async fn start(
        record: ServerRecord,
        context: &FileServerContext,
    ) -> Result<Self, ServerError> {
        let port = record.port;
        let listener = TcpListener::bind((context.host.as_str(), port))
            .await
            .map_err(|source| ServerError::ListenerBind { port, source })?;

        let app = router(Arc::new(ServeState::new(record.path.clone(), context)));
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(port, error = %e, "File server stopped with error");
            }
        });

        tracing::info!(port, root = %record.path.display(), "File server started");
        Ok(Self { record, task })
    }

    pub(crate) fn record(&self) -> &ServerRecord {
        &self.record
    }

    /// Stop serving and release the listener.
    ///
    /// Returns once the listener is closed.
    pub(crate) async fn stop(self) {
        self.task.abort();
        // Cancellation is the expected outcome
        let _ = self.task.await;
        tracing::info!(port = self.record.port, "File server stopped");
    }
}

/// Request handling state for one file server.
struct ServeState {
    root: PathBuf,
    serve_dir: ServeDir,
    manager_port: u16,
    live_reload: Arc<AtomicBool>,
}

impl ServeState {
    fn new(root: PathBuf, context: &FileServerContext) -> Self {
        Self {
            serve_dir: ServeDir::new(&root),
            root,
            manager_port: context.manager_port,
            live_reload: Arc::clone(&context.live_reload),
        }
    }

    fn live_reload_enabled(&self) -> bool {
        self.live_reload.load(Ordering::SeqCst)
    }
}

fn router(state: Arc<ServeState>) -> Router {
    Router::new()
        .fallback(serve_request)
        .layer(headers::no_cache_layer())
        .with_state(state)
}

async fn serve_request(State(state): State<Arc<ServeState>>, req: Request<Body>) -> Response {
    let request_path = req.uri().path().to_owned();

    if let Some(mut target) = resolve_target(&state.root, &request_path) {
        if target.is_dir() {
            let index = target.join("index.html");
            if index.is_file() {
                target = index;
            } else if request_path.ends_with('/') {
                return directory_listing(&target, &request_path).await;
            }
        }

        if state.live_reload_enabled() && is_html_file(&target) {
            match tokio::fs::read(&target).await {
                Ok(content) => return inject_reload_script(content, state.manager_port),
                Err(e) => {
                    tracing::debug!(path = %target.display(), error = %e, "Falling back to static serving");
                }
            }
        }
    }

    match state.serve_dir.clone().oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Map a request path onto the root, rejecting traversal.
fn resolve_target(root: &Path, request_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(request_path).decode_utf8().ok()?;
    let mut target = root.to_path_buf();

    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => target.push(s),
        }
    }

    Some(target)
}

/// Check whether a path has an `.html` or `.htm` extension (any case).
pub(crate) fn is_html_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

/// Script tag appended to HTML responses.
fn reload_script_tag(manager_port: u16) -> String {
    format!("\n<script src=\"http://localhost:{manager_port}/livereload.js\"></script>\n")
}

fn inject_reload_script(mut content: Vec<u8>, manager_port: u16) -> Response {
    content.extend_from_slice(reload_script_tag(manager_port).as_bytes());
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        content,
    )
        .into_response()
}

/// Render a listing for a directory without `index.html`.
async fn directory_listing(dir: &Path, request_path: &str) -> Response {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return StatusCode::FORBIDDEN.into_response();
        }
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let mut entries = Vec::new();
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
                entries.push((name, is_dir));
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Directory listing cut short");
                break;
            }
        }
    }
    entries.sort();

    let mut body = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head><body>\n<h1>{title}</h1>\n<ul>\n",
        title = html::escape(request_path)
    );
    for (name, is_dir) in entries {
        let suffix = if is_dir { "/" } else { "" };
        body.push_str(&format!(
            "<li><a href=\"{href}{suffix}\">{label}{suffix}</a></li>\n",
            href = html::encode_segment(&name),
            label = html::escape(&name),
        ));
    }
    body.push_str("</ul>\n</body></html>\n");

    Html(body).into_response()
}
