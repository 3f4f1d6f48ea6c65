//! Live reload connection hub.
//!
//! Each handshaken websocket owns a bounded outbound queue. Broadcasting
//! snapshots the queue senders under a short lock and then pushes with
//! `try_send`, so a slow client never blocks the caller or other clients.
//!
//! - closed queue: the connection is gone and is pruned from the hub
//! - full queue: the message is dropped for that connection only

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::protocol::ReloadMessage;

/// Identifier of a registered connection.
pub(crate) type ConnectionId = u64;

/// Default outbound queue capacity per connection.
pub(crate) const DEFAULT_CLIENT_BUFFER: usize = 16;

/// Set of live reload connections.
pub(crate) struct LiveReloadHub {
    connections: Mutex<HashMap<ConnectionId, mpsc::Sender<Arc<str>>>>,
    next_id: AtomicU64,
    client_buffer: usize,
}

impl LiveReloadHub {
    /// Create a hub whose connections queue up to `client_buffer` messages.
    pub(crate) fn new(client_buffer: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            client_buffer: client_buffer.max(1),
        }
    }

    /// Register a connection, returning its id and outbound queue.
    pub(crate) fn register(&self) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(self.client_buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, tx);
        tracing::debug!(connection = id, "Live reload client registered");
        (id, rx)
    }

    /// Remove a connection. Unknown ids are ignored.
    pub(crate) fn unregister(&self, id: ConnectionId) {
        if self.lock().remove(&id).is_some() {
            tracing::debug!(connection = id, "Live reload client removed");
        }
    }

    /// Number of registered connections.
    pub(crate) fn connection_count(&self) -> usize {
        self.lock().len()
    }

    /// Send a reload command for `path` to every connection.
    ///
    /// Returns the number of connections the message was queued for.
    pub(crate) fn broadcast_reload(&self, path: &str) -> usize {
        let message: Arc<str> = ReloadMessage::new(path).to_json().into();
        self.broadcast(&message)
    }

    fn broadcast(&self, message: &Arc<str>) -> usize {
        let snapshot: Vec<(ConnectionId, mpsc::Sender<Arc<str>>)> = self
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in snapshot {
            match tx.try_send(Arc::clone(message)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(connection = id, "Live reload client stalled, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut connections = self.lock();
            for id in closed {
                connections.remove(&id);
                tracing::debug!(connection = id, "Pruned closed live reload client");
            }
        }

        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, mpsc::Sender<Arc<str>>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a background task that stops when told to or when dropped.
pub(crate) struct TaskHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Signal the task to stop and wait for it to finish.
    pub(crate) async fn stop(mut self) {
        self.shutdown.take();
        if let Err(e) = (&mut self.join).await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
}

/// Spawn the task that drains changed paths and broadcasts reloads.
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_broadcaster(
    mut changes: mpsc::Receiver<PathBuf>,
    hub: Arc<LiveReloadHub>,
) -> TaskHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                change = changes.recv() => {
                    let Some(path) = change else { break };
                    let path = path.display().to_string();
                    let delivered = hub.broadcast_reload(&path);
                    tracing::info!(path = %path, clients = delivered, "File changed");
                }
            }
        }
        tracing::debug!("Live reload broadcaster stopped");
    });

    TaskHandle {
        shutdown: Some(shutdown_tx),
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn reload_json(path: &str) -> String {
        ReloadMessage::new(path).to_json()
    }

    #[test]
    fn test_register_and_unregister() {
        let hub = LiveReloadHub::new(4);
        let (first, _rx1) = hub.register();
        let (second, _rx2) = hub.register();

        assert_ne!(first, second);
        assert_eq!(hub.connection_count(), 2);

        hub.unregister(first);
        hub.unregister(first);
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn test_broadcast_reaches_every_connection() {
        let hub = LiveReloadHub::new(4);
        let (_a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        assert_eq!(hub.broadcast_reload("/site/index.html"), 2);

        let expected = reload_json("/site/index.html");
        assert_eq!(rx_a.try_recv().unwrap().as_ref(), expected);
        assert_eq!(rx_b.try_recv().unwrap().as_ref(), expected);
    }

    #[test]
    fn test_closed_connection_pruned_others_still_delivered() {
        let hub = LiveReloadHub::new(4);
        let (_a, mut rx_a) = hub.register();
        let (_dead, rx_dead) = hub.register();
        let (_c, mut rx_c) = hub.register();
        drop(rx_dead);

        assert_eq!(hub.broadcast_reload("/x/style.css"), 2);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
        assert_eq!(hub.connection_count(), 2);
    }

    #[test]
    fn test_stalled_connection_keeps_registration() {
        let hub = LiveReloadHub::new(1);
        let (_slow, mut rx_slow) = hub.register();
        let (_fast, mut rx_fast) = hub.register();

        assert_eq!(hub.broadcast_reload("/a"), 2);
        assert!(rx_fast.try_recv().is_ok());

        // Slow client has not drained its queue, second message is dropped for it only
        assert_eq!(hub.broadcast_reload("/b"), 1);
        assert_eq!(hub.connection_count(), 2);

        assert_eq!(rx_slow.try_recv().unwrap().as_ref(), reload_json("/a"));
        assert!(rx_slow.try_recv().is_err());
        assert_eq!(rx_fast.try_recv().unwrap().as_ref(), reload_json("/b"));
    }

    #[test]
    fn test_broadcast_without_connections() {
        let hub = LiveReloadHub::new(DEFAULT_CLIENT_BUFFER);
        assert_eq!(hub.broadcast_reload("/nothing"), 0);
    }

    #[tokio::test]
    async fn test_broadcaster_forwards_changes_until_stopped() {
        let hub = Arc::new(LiveReloadHub::new(4));
        let (_id, mut rx) = hub.register();
        let (tx, changes) = mpsc::channel(8);

        let handle = spawn_broadcaster(changes, Arc::clone(&hub));
        tx.send(PathBuf::from("/site/a.html")).await.unwrap();

        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.as_ref(), reload_json("/site/a.html"));

        handle.stop().await;
        assert!(tx.send(PathBuf::from("/site/b.html")).await.is_err());
    }

    #[tokio::test]
    async fn test_broadcaster_exits_when_channel_closes() {
        let hub = Arc::new(LiveReloadHub::new(4));
        let (tx, changes) = mpsc::channel::<PathBuf>(8);

        let handle = spawn_broadcaster(changes, hub);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .unwrap();
    }
}
