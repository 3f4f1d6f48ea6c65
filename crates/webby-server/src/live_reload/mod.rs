//! Live reload system.
//!
//! Provides file watching and WebSocket-based reload notifications
//! to connected browsers when served files change.
//!
//! ```text
//! notify ──► RootWatcher ──(.git filter, debounce)──► change channel
//!                                                          │
//!                                               broadcaster task
//!                                                          │
//!                                   LiveReloadHub ──try_send──► per-socket queues
//! ```

mod debouncer;
mod hub;
mod protocol;
mod watcher;
mod websocket;

pub(crate) use debouncer::DEFAULT_DEBOUNCE;
pub(crate) use hub::{DEFAULT_CLIENT_BUFFER, LiveReloadHub, TaskHandle, spawn_broadcaster};
pub(crate) use watcher::{CHANGE_CHANNEL_CAPACITY, RootWatcher};
pub(crate) use websocket::ws_handler;
