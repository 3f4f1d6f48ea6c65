//! Error types for the manager and file servers.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Every port in the configured range is taken.
    #[error("No free port in range {start}-{end}")]
    PortExhausted {
        /// First port of the range.
        start: u16,
        /// Last port of the range.
        end: u16,
    },

    /// No file server is registered under the given id.
    #[error("File server with id {0} not found")]
    FileServerNotFound(u64),

    /// Binding a listener failed.
    #[error("Failed to bind port {port}: {source}")]
    ListenerBind {
        /// Port that could not be bound.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The requested root path cannot be served.
    #[error("Invalid root path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::PortExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::FileServerNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Self::ListenerBind { .. } | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::warn!(status = status.as_u16(), error = %self, "Control request failed");
        (status, axum::Json(json!({"error": self.to_string()}))).into_response()
    }
}
