//! Change debouncing for live reload.
//!
//! Editors emit several filesystem events per save. Only the first event of a
//! burst is forwarded: an event is accepted when strictly more than the
//! debounce window has passed since the previous accepted event. Events inside
//! the window are dropped, not queued. The window is shared by all roots.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default debounce window.
pub(crate) const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(10);

/// Thread-safe change debouncer.
pub(crate) struct ChangeDebouncer {
    window: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl ChangeDebouncer {
    /// Create a new debouncer with the given window.
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: Mutex::new(None),
        }
    }

    /// Decide whether an event arriving now is forwarded.
    ///
    /// Thread-safe, called from notify callbacks.
    pub(crate) fn accept(&self) -> bool {
        self.accept_at(Instant::now())
    }

    /// Decide whether an event arriving at `now` is forwarded.
    pub(crate) fn accept_at(&self, now: Instant) -> bool {
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match *last {
            Some(previous) if now.saturating_duration_since(previous) <= self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl Default for ChangeDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
