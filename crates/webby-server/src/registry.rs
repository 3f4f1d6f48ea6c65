//! Registry of running file servers.
//!
//! [`Manager`] owns every file server, the port pool, the watched roots and
//! the live reload hub. Add and delete are serialized through one async
//! mutex that stays held across the port bind, so two concurrent adds of the
//! same root always observe each other.

use std::net::Ipv4Addr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use crate::error::ServerError;
use crate::file_server::{FileServer, FileServerContext};
use crate::live_reload::{
    CHANGE_CHANNEL_CAPACITY, DEFAULT_CLIENT_BUFFER, DEFAULT_DEBOUNCE, LiveReloadHub, RootWatcher,
    TaskHandle, spawn_broadcaster,
};
use crate::network;
use crate::ports::{PortAllocator, PortRange};
use crate::record::ServerRecord;

/// Manager settings.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Host every listener binds to.
    pub host: String,
    /// Control port, referenced by the injected reload script.
    pub port: u16,
    /// Ports handed out to file servers.
    pub ports: PortRange,
    /// Live reload state at startup.
    pub live_reload_enabled: bool,
    /// Minimum gap between two forwarded change events.
    pub debounce: Duration,
    /// Outbound queue capacity per live reload client.
    pub client_buffer: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 35729,
            ports: PortRange::default(),
            live_reload_enabled: true,
            debounce: DEFAULT_DEBOUNCE,
            client_buffer: DEFAULT_CLIENT_BUFFER,
        }
    }
}

/// Split a requested path into the canonical root and the opened file.
///
/// The path names a file when it is an existing file, or when its base name
/// contains a `.` and it is not an existing directory. In that case the root
/// is its parent directory. The result is absolute and lexically normalized.
///
/// # Errors
///
/// Returns [`ServerError::InvalidPath`] for an empty path or a file path
/// without a parent.
pub fn canonical_root(path: &Path) -> Result<(PathBuf, Option<String>), ServerError> {
    if path.as_os_str().is_empty() {
        return Err(ServerError::InvalidPath(path.to_path_buf()));
    }
    let absolute = normalize(&std::path::absolute(path)?);

    let file_name = absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let names_file = absolute.is_file()
        || (!absolute.is_dir() && file_name.as_deref().is_some_and(|n| n.contains('.')));

    if !names_file {
        return Ok((absolute, None));
    }

    let root = absolute
        .parent()
        .ok_or_else(|| ServerError::InvalidPath(absolute.clone()))?
        .to_path_buf();
    Ok((root, file_name))
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

struct RegistryState {
    servers: Vec<FileServer>,
    next_id: u64,
    ports: PortAllocator,
    watcher: RootWatcher,
}

impl RegistryState {
    fn position_by_root(&self, root: &Path) -> Option<usize> {
        self.servers.iter().position(|s| s.record().path == root)
    }

    fn root_in_use(&self, root: &Path) -> bool {
        self.position_by_root(root).is_some()
    }
}

/// Coordinates file servers, watched roots and live reload.
pub struct Manager {
    config: ManagerConfig,
    state: Mutex<RegistryState>,
    live_reload: Arc<AtomicBool>,
    hub: Arc<LiveReloadHub>,
    broadcaster: std::sync::Mutex<Option<TaskHandle>>,
    network_ip: Option<Ipv4Addr>,
}

impl Manager {
    /// Create a manager and start its live reload broadcaster.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(config: ManagerConfig) -> Arc<Self> {
        let (changes_tx, changes_rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let hub = Arc::new(LiveReloadHub::new(config.client_buffer));
        let broadcaster = spawn_broadcaster(changes_rx, Arc::clone(&hub));

        let state = RegistryState {
            servers: Vec::new(),
            next_id: 1,
            ports: PortAllocator::new(config.ports, &config.host),
            watcher: RootWatcher::new(config.debounce, changes_tx),
        };

        tracing::info!(
            port = config.port,
            ports = %format!("{}-{}", config.ports.start, config.ports.end),
            live_reload = config.live_reload_enabled,
            "Manager started"
        );

        let network_ip = if network::is_wildcard(&config.host) {
            network::lan_ip()
        } else {
            None
        };

        Arc::new(Self {
            live_reload: Arc::new(AtomicBool::new(config.live_reload_enabled)),
            network_ip,
            config,
            state: Mutex::new(state),
            hub,
            broadcaster: std::sync::Mutex::new(Some(broadcaster)),
        })
    }

    /// Control port of this manager.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// LAN address other devices can reach the servers on.
    ///
    /// Only resolved when listeners bind every interface.
    #[must_use]
    pub fn network_ip(&self) -> Option<Ipv4Addr> {
        self.network_ip
    }

    /// Serve `path`, reusing the existing server for the same root.
    ///
    /// Returns the record and whether a new server was started. When `path`
    /// names a file, the record carries its name.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid, no port is free, or the
    /// listener cannot be bound. Nothing is registered on failure.
    pub async fn add_server(&self, path: &Path) -> Result<(ServerRecord, bool), ServerError> {
        let (root, file) = canonical_root(path)?;
        let mut state = self.state.lock().await;

        if let Some(index) = state.position_by_root(&root) {
            let mut record = state.servers[index].record().clone();
            record.file = file;
            tracing::debug!(id = record.id, root = %root.display(), "Reusing file server");
            return Ok((record, false));
        }

        let port = state.ports.allocate()?;
        let record = ServerRecord {
            id: state.next_id,
            port,
            path: root.clone(),
            file,
        };

        let server = match FileServer::start(record.clone(), &self.file_server_context()).await {
            Ok(server) => server,
            Err(e) => {
                state.ports.release(port);
                return Err(e);
            }
        };

        state.next_id += 1;
        state.servers.push(server);
        state.watcher.watch(&root);

        tracing::info!(id = record.id, port, root = %root.display(), "Added file server");
        Ok((record, true))
    }

    /// Stop and remove the server with `id`.
    ///
    /// The root stops being watched once no other server uses it.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::FileServerNotFound`] for an unknown id, in which
    /// case nothing changes.
    pub async fn delete_server(&self, id: u64) -> Result<ServerRecord, ServerError> {
        let mut state = self.state.lock().await;

        let index = state
            .servers
            .iter()
            .position(|s| s.record().id == id)
            .ok_or(ServerError::FileServerNotFound(id))?;

        let server = state.servers.remove(index);
        let record = server.record().clone();
        server.stop().await;
        state.ports.release(record.port);

        if !state.root_in_use(&record.path) {
            state.watcher.unwatch(&record.path);
        }

        tracing::info!(id, port = record.port, root = %record.path.display(), "Deleted file server");
        Ok(record)
    }

    /// Find the server for a canonical root.
    pub async fn find_by_path(&self, root: &Path) -> Option<ServerRecord> {
        let state = self.state.lock().await;
        state
            .position_by_root(root)
            .map(|index| state.servers[index].record().clone())
    }

    /// Find a server by id.
    pub async fn find_by_id(&self, id: u64) -> Option<ServerRecord> {
        self.state
            .lock()
            .await
            .servers
            .iter()
            .find(|s| s.record().id == id)
            .map(|s| s.record().clone())
    }

    /// All servers in creation order.
    pub async fn servers(&self) -> Vec<ServerRecord> {
        self.state
            .lock()
            .await
            .servers
            .iter()
            .map(|s| s.record().clone())
            .collect()
    }

    /// Roots currently watched for changes, sorted.
    pub async fn watched_roots(&self) -> Vec<PathBuf> {
        self.state.lock().await.watcher.roots()
    }

    /// Whether HTML responses currently get the reload script.
    #[must_use]
    pub fn live_reload_enabled(&self) -> bool {
        self.live_reload.load(Ordering::SeqCst)
    }

    /// Flip live reload and return the new state.
    pub async fn toggle_live_reload(&self) -> bool {
        let _state = self.state.lock().await;
        let enabled = !self.live_reload.load(Ordering::SeqCst);
        self.live_reload.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "Live reload toggled");
        enabled
    }

    /// Stop the broadcaster and every file server.
    pub async fn shutdown(&self) {
        let broadcaster = self
            .broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(broadcaster) = broadcaster {
            broadcaster.stop().await;
        }

        let mut state = self.state.lock().await;
        state.watcher.clear();
        for server in std::mem::take(&mut state.servers) {
            let port = server.record().port;
            server.stop().await;
            state.ports.release(port);
        }

        tracing::info!("Manager stopped");
    }

    pub(crate) fn hub(&self) -> Arc<LiveReloadHub> {
        Arc::clone(&self.hub)
    }

    fn file_server_context(&self) -> FileServerContext {
        FileServerContext {
            host: self.config.host.clone(),
            manager_port: self.config.port,
            live_reload: Arc::clone(&self.live_reload),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU16;

    static NEXT_RANGE: AtomicU16 = AtomicU16::new(21000);

    /// Manager config with a port range no other test uses.
    pub(crate) fn test_config(width: u16) -> ManagerConfig {
        let start = NEXT_RANGE.fetch_add(width, Ordering::SeqCst);
        ManagerConfig {
            ports: PortRange {
                start,
                end: start + width - 1,
            },
            ..ManagerConfig::default()
        }
    }

    #[test]
    fn test_canonical_root_directory() {
        let dir = tempfile::tempdir().unwrap();

        let (root, file) = canonical_root(dir.path()).unwrap();

        assert_eq!(root, dir.path());
        assert_eq!(file, None);
    }

    #[test]
    fn test_canonical_root_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), "x").unwrap();

        let (root, file) = canonical_root(&dir.path().join("README")).unwrap();

        assert_eq!(root, dir.path());
        assert_eq!(file.as_deref(), Some("README"));
    }

    #[test]
    fn test_canonical_root_dotted_missing_name_is_file() {
        let dir = tempfile::tempdir().unwrap();

        let (root, file) = canonical_root(&dir.path().join("page.html")).unwrap();

        assert_eq!(root, dir.path());
        assert_eq!(file.as_deref(), Some("page.html"));
    }

    #[test]
    fn test_canonical_root_dotted_directory() {
        let dir = tempfile::tempdir().unwrap();
        let site = dir.path().join("site.v2");
        std::fs::create_dir(&site).unwrap();

        let (root, file) = canonical_root(&site).unwrap();

        assert_eq!(root, site);
        assert_eq!(file, None);
    }

    #[test]
    fn test_canonical_root_normalizes_dots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let (root, _) = canonical_root(&dir.path().join("a/./../a/")).unwrap();

        assert_eq!(root, dir.path().join("a"));
    }

    #[test]
    fn test_canonical_root_empty_path() {
        let err = canonical_root(Path::new("")).unwrap_err();
        assert!(matches!(err, ServerError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_add_same_root_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::start(test_config(10));

        let (first, first_new) = manager.add_server(dir.path()).await.unwrap();
        let (second, second_new) = manager.add_server(dir.path()).await.unwrap();

        assert!(first_new);
        assert!(!second_new);
        assert_eq!(first, second);
        assert_eq!(manager.servers().await.len(), 1);
        assert_eq!(manager.watched_roots().await, vec![dir.path().to_path_buf()]);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_loopback_host_has_no_network_ip() {
        let manager = Manager::start(test_config(1));

        assert_eq!(manager.network_ip(), None);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_add_file_serves_parent_with_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.html"), "<h1>Hi</h1>").unwrap();
        let manager = Manager::start(test_config(10));

        let (record, is_new) = manager
            .add_server(&dir.path().join("test.html"))
            .await
            .unwrap();

        assert!(is_new);
        assert_eq!(record.path, dir.path());
        assert_eq!(record.file.as_deref(), Some("test.html"));
        assert_eq!(manager.find_by_path(dir.path()).await.unwrap().id, record.id);

        let url = format!("http://127.0.0.1:{}/test.html", record.port);
        let body = tokio::task::spawn_blocking(move || {
            ureq::get(&url)
                .call()
                .unwrap()
                .body_mut()
                .read_to_string()
                .unwrap()
        })
        .await
        .unwrap();
        assert_eq!(body.matches("/livereload.js").count(), 1);

        manager.toggle_live_reload().await;
        let url = format!("http://127.0.0.1:{}/test.html", record.port);
        let body = tokio::task::spawn_blocking(move || {
            ureq::get(&url)
                .call()
                .unwrap()
                .body_mut()
                .read_to_string()
                .unwrap()
        })
        .await
        .unwrap();
        assert_eq!(body, "<h1>Hi</h1>");

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_closes_port_and_unwatches_root() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::start(test_config(10));
        let (record, _) = manager.add_server(dir.path()).await.unwrap();
        assert_eq!(manager.watched_roots().await, vec![dir.path().to_path_buf()]);

        let deleted = manager.delete_server(record.id).await.unwrap();

        assert_eq!(deleted, record);
        assert!(manager.find_by_id(record.id).await.is_none());
        assert!(manager.watched_roots().await.is_empty());
        assert!(
            tokio::net::TcpStream::connect(("127.0.0.1", record.port))
                .await
                .is_err()
        );

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_unknown_id_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::start(test_config(10));
        manager.add_server(dir.path()).await.unwrap();

        let err = manager.delete_server(999).await.unwrap_err();

        assert!(matches!(err, ServerError::FileServerNotFound(999)));
        assert_eq!(manager.servers().await.len(), 1);
        assert_eq!(manager.watched_roots().await.len(), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_deleted_port_is_reused() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let manager = Manager::start(test_config(10));

        let (a, _) = manager.add_server(first.path()).await.unwrap();
        manager.delete_server(a.id).await.unwrap();
        let (b, _) = manager.add_server(second.path()).await.unwrap();

        assert_eq!(b.port, a.port);
        assert!(b.id > a.id);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_port_exhaustion_registers_nothing() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let manager = Manager::start(test_config(1));

        manager.add_server(first.path()).await.unwrap();
        let err = manager.add_server(second.path()).await.unwrap_err();

        assert!(matches!(err, ServerError::PortExhausted { .. }));
        assert_eq!(manager.servers().await.len(), 1);
        assert_eq!(manager.watched_roots().await, vec![first.path().to_path_buf()]);

        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_get_distinct_ids_and_ports() {
        const N: usize = 8;
        let dirs: Vec<_> = (0..N).map(|_| tempfile::tempdir().unwrap()).collect();
        let manager = Manager::start(test_config(20));

        let tasks: Vec<_> = dirs
            .iter()
            .map(|dir| {
                let manager = Arc::clone(&manager);
                let path = dir.path().to_path_buf();
                tokio::spawn(async move { manager.add_server(&path).await })
            })
            .collect();

        let mut records = Vec::new();
        for task in tasks {
            let (record, is_new) = task.await.unwrap().unwrap();
            assert!(is_new);
            records.push(record);
        }

        let ids: HashSet<_> = records.iter().map(|r| r.id).collect();
        let ports: HashSet<_> = records.iter().map(|r| r.port).collect();
        assert_eq!(ids.len(), N);
        assert_eq!(ports.len(), N);
        assert_eq!(manager.watched_roots().await.len(), N);

        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_of_same_root_share_one_server() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::start(test_config(10));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let path = dir.path().to_path_buf();
                tokio::spawn(async move { manager.add_server(&path).await })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            let (_, is_new) = task.await.unwrap().unwrap();
            created += usize::from(is_new);
        }

        assert_eq!(created, 1);
        assert_eq!(manager.servers().await.len(), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_toggle_live_reload() {
        let manager = Manager::start(test_config(1));
        assert!(manager.live_reload_enabled());

        assert!(!manager.toggle_live_reload().await);
        assert!(!manager.live_reload_enabled());
        assert!(manager.toggle_live_reload().await);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_server() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let manager = Manager::start(test_config(10));
        let (a, _) = manager.add_server(first.path()).await.unwrap();
        let (b, _) = manager.add_server(second.path()).await.unwrap();

        manager.shutdown().await;

        assert!(manager.servers().await.is_empty());
        assert!(manager.watched_roots().await.is_empty());
        for port in [a.port, b.port] {
            assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err());
        }
    }
}
