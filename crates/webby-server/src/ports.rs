//! Port allocation for file servers.
//!
//! Ports are handed out from a fixed inclusive range by ascending scan. A port
//! is usable when this process has not handed it out already and a transient
//! bind on it succeeds.

use std::collections::BTreeSet;
use std::net::TcpListener;
use std::sync::Arc;

use crate::error::ServerError;

/// Check whether `port` can currently be bound on `host`.
///
/// The listener is released immediately.
#[must_use]
pub fn is_port_free(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

/// Inclusive port range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Check if port is within this range.
    #[cfg(test)]
    pub(crate) fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 8000,
            end: 9000,
        }
    }
}

type AvailabilityCheck = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Hands out ports from a [`PortRange`], remembering what it gave away.
pub(crate) struct PortAllocator {
    range: PortRange,
    allocated: BTreeSet<u16>,
    check: AvailabilityCheck,
}

impl PortAllocator {
    /// Create an allocator that checks `host` for availability.
    pub(crate) fn new(range: PortRange, host: &str) -> Self {
        let host = host.to_owned();
        Self::with_check(range, move |port| is_port_free(&host, port))
    }

    /// Create an allocator with a custom availability check.
    pub(crate) fn with_check(
        range: PortRange,
        check: impl Fn(u16) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            range,
            allocated: BTreeSet::new(),
            check: Arc::new(check),
        }
    }

    /// Allocate the lowest usable port in the range.
    pub(crate) fn allocate(&mut self) -> Result<u16, ServerError> {
        let port = (self.range.start..=self.range.end)
            .find(|port| !self.allocated.contains(port) && (self.check)(*port))
            .ok_or(ServerError::PortExhausted {
                start: self.range.start,
                end: self.range.end,
            })?;

        self.allocated.insert(port);
        tracing::debug!(port, "Allocated port");
        Ok(port)
    }

    /// Return a port to the pool.
    pub(crate) fn release(&mut self, port: u16) {
        self.allocated.remove(&port);
    }

    /// Whether `port` is currently handed out.
    #[cfg(test)]
    pub(crate) fn is_allocated(&self, port: u16) -> bool {
        self.allocated.contains(&port)
    }
}
