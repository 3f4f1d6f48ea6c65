//! File servers and live reload for Webby.
//!
//! One coordinating process, the manager, serves any number of directories,
//! each on its own port, and pushes reload notifications to connected
//! browsers when served files change. A second process finding the control
//! port taken hands its request to the running manager instead.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::Path;
//! use webby_server::{Manager, ManagerConfig, serve_control};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ManagerConfig::default();
//!     let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
//!         .await
//!         .unwrap();
//!     let manager = Manager::start(config);
//!
//!     let (record, _) = manager.add_server(Path::new("site")).await.unwrap();
//!     println!("Serving on {}", record.url());
//!
//!     serve_control(listener, manager, async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! CLI ──► Manager ──► PortAllocator
//!            │
//!            ├─► FileServer per root (ServeDir + script injection)
//!            │
//!            ├─► RootWatcher (notify) ──► broadcaster ──► LiveReloadHub
//!            │
//!            └─► control router (:35729)
//!                    ├─► /create-server, /delete-server, /toggle-livereload
//!                    ├─► / status page, /api/servers
//!                    └─► /livereload.js, /livereload (WebSocket)
//! ```

mod app;
mod error;
mod file_server;
mod handlers;
mod handoff;
mod html;
mod live_reload;
mod middleware;
mod network;
mod ports;
mod record;
mod registry;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use error::ServerError;
pub use handoff::{HandoffError, SingleInstanceClient};
pub use ports::{PortRange, is_port_free};
pub use record::ServerRecord;
pub use registry::{Manager, ManagerConfig, canonical_root};

/// Serve the control API until `shutdown` resolves, then stop the manager.
///
/// # Errors
///
/// Returns an error if the control server fails.
pub async fn serve_control(
    listener: tokio::net::TcpListener,
    manager: Arc<Manager>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    if let Ok(address) = listener.local_addr() {
        tracing::info!(address = %address, "Starting control server");
    }

    let app = app::create_router(Arc::clone(&manager));
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    manager.shutdown().await;
    result.map_err(ServerError::from)
}

/// Create manager configuration from Webby config.
#[must_use]
pub fn manager_config_from_config(config: &webby_config::Config) -> ManagerConfig {
    ManagerConfig {
        host: config.manager.host.clone(),
        port: config.manager.port,
        ports: PortRange {
            start: config.ports.start,
            end: config.ports.end,
        },
        live_reload_enabled: config.live_reload.enabled,
        debounce: Duration::from_millis(config.live_reload.debounce_ms),
        client_buffer: config.live_reload.client_buffer,
    }
}
