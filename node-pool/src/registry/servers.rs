use crate::pool::Server;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use super::selector::DEFAULT_LATENCY_TOLERANCE;

/// Known cluster nodes, kept sorted by resolved address.
///
/// Structural changes (`add`/`remove`) belong to the topology refresher and
/// take `&mut self`; selection only read-locks individual servers.
#[derive(Debug)]
pub struct Servers {
    slice: Vec<Arc<Server>>,
    pub(super) latency_tolerance: Duration,
}

impl Servers {
    pub fn new() -> Self {
        Self::with_latency_tolerance(DEFAULT_LATENCY_TOLERANCE)
    }

    /// `tolerance` is how far apart two latencies must be before the lower
    /// one wins a best-fit comparison.
    pub fn with_latency_tolerance(tolerance: Duration) -> Self {
        Self {
            slice: Vec::new(),
            latency_tolerance: tolerance,
        }
    }

    pub fn latency_tolerance(&self) -> Duration {
        self.latency_tolerance
    }

    fn position(&self, resolved_addr: &str) -> Result<usize, usize> {
        self.slice
            .binary_search_by(|s| s.resolved_addr().cmp(resolved_addr))
    }

    pub fn search(&self, resolved_addr: &str) -> Option<Arc<Server>> {
        self.position(resolved_addr)
            .ok()
            .map(|i| Arc::clone(&self.slice[i]))
    }

    /// Inserts `server` in address order. A server already registered under
    /// the same resolved address is replaced and returned.
    pub fn add(&mut self, server: Arc<Server>) -> Option<Arc<Server>> {
        match self.position(server.resolved_addr()) {
            Ok(i) => Some(mem::replace(&mut self.slice[i], server)),
            Err(i) => {
                self.slice.insert(i, server);
                None
            }
        }
    }

    pub fn remove(&mut self, resolved_addr: &str) -> Option<Arc<Server>> {
        self.position(resolved_addr)
            .ok()
            .map(|i| self.slice.remove(i))
    }

    pub fn get(&self, i: usize) -> Option<&Arc<Server>> {
        self.slice.get(i)
    }

    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Server>> {
        self.slice.iter()
    }

    pub(super) fn as_slice(&self) -> &[Arc<Server>] {
        &self.slice
    }

    /// Whether any known node is a router.
    pub fn has_routers(&self) -> bool {
        self.slice.iter().any(|s| s.info().router)
    }
}

impl Default for Servers {
    fn default() -> Self {
        Self::new()
    }
}
