//! Filesystem watching for served roots.
//!
//! One recursive notify watcher per root. Events are filtered and debounced in
//! the notify callback and accepted paths are pushed onto the change channel
//! drained by the broadcaster.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::debouncer::ChangeDebouncer;

/// Capacity of the change channel between watchers and the broadcaster.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 100;

/// Watched roots and their notify subscriptions.
///
/// A root whose watch could not be set up stays in the set without a
/// subscription, so the set always covers every served root.
pub(crate) struct RootWatcher {
    roots: BTreeMap<PathBuf, Option<RecommendedWatcher>>,
    debouncer: Arc<ChangeDebouncer>,
    changes: mpsc::Sender<PathBuf>,
}

impl RootWatcher {
    pub(crate) fn new(debounce: Duration, changes: mpsc::Sender<PathBuf>) -> Self {
        Self {
            roots: BTreeMap::new(),
            debouncer: Arc::new(ChangeDebouncer::new(debounce)),
            changes,
        }
    }

    /// Start watching `root`. Returns `false` if it was already watched.
    pub(crate) fn watch(&mut self, root: &Path) -> bool {
        if self.roots.contains_key(root) {
            return false;
        }

        let watcher = self
            .subscribe(root)
            .inspect(|_| tracing::debug!(root = %root.display(), "Watching for changes"))
            .inspect_err(|e| {
                tracing::warn!(root = %root.display(), error = %e, "Failed to watch root");
            })
            .ok();

        self.roots.insert(root.to_path_buf(), watcher);
        true
    }

    /// Stop watching `root`. Returns `false` if it was not watched.
    pub(crate) fn unwatch(&mut self, root: &Path) -> bool {
        let removed = self.roots.remove(root).is_some();
        if removed {
            tracing::debug!(root = %root.display(), "Stopped watching");
        }
        removed
    }

    /// Stop every subscription.
    pub(crate) fn clear(&mut self) {
        self.roots.clear();
    }

    /// Watched roots in sorted order.
    pub(crate) fn roots(&self) -> Vec<PathBuf> {
        self.roots.keys().cloned().collect()
    }

    pub(crate) fn contains(&self, root: &Path) -> bool {
        self.roots.contains_key(root)
    }

    fn subscribe(&self, root: &Path) -> Result<RecommendedWatcher, notify::Error> {
        let debouncer = Arc::clone(&self.debouncer);
        let changes = self.changes.clone();
        let watched = root.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => forward_event(&event, &debouncer, &changes),
                Err(e) => {
                    tracing::warn!(root = %watched.display(), error = %e, "File watcher error");
                }
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }
}

/// Check whether a path lies inside a `.git` directory.
pub(crate) fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == ".git")
}

/// Filter and debounce one raw event, pushing accepted paths onto `changes`.
pub(crate) fn forward_event(
    event: &Event,
    debouncer: &ChangeDebouncer,
    changes: &mpsc::Sender<PathBuf>,
) {
    let relevant = match event.kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Create(_) | EventKind::Modify(_) => true,
        _ => false,
    };
    if !relevant {
        return;
    }

    for path in &event.paths {
        if is_ignored(path) {
            tracing::trace!(path = %path.display(), "Ignoring git change");
            continue;
        }
        if !debouncer.accept() {
            tracing::trace!(path = %path.display(), "Change debounced");
            continue;
        }

        match changes.try_send(path.clone()) {
            Ok(()) => tracing::debug!(path = %path.display(), "Change accepted"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(path = %path.display(), "Change channel full, dropping change");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(path = %path.display(), "Change channel closed");
            }
        }
    }
}
