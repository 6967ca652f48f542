//! On-demand connection controller.
//!
//! Tracks which destinations are currently wanted and asks the routing
//! fabric for direct connections to them. Desire never expires on its own;
//! releasing an address is left to the embedding application's policy.

use crate::connection::RoutingFabric;
use crate::OverlayAddr;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default minimum gap between repeated connection requests for one address.
pub const DEFAULT_REQUEST_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug)]
struct Desire {
    /// Last time the address was marked (outbound send or inbound data).
    last_active: Instant,
    /// Last time a connection was requested from the fabric.
    last_request: Option<Instant>,
}

/// Desired-address registry driving the fabric's direct connections.
pub struct OnDemandController {
    fabric: Arc<dyn RoutingFabric>,
    desired: Mutex<HashMap<OverlayAddr, Desire>>,
    request_backoff: Duration,
}

impl OnDemandController {
    /// Create a controller with the default request backoff.
    pub fn new(fabric: Arc<dyn RoutingFabric>) -> Self {
        Self::with_backoff(fabric, DEFAULT_REQUEST_BACKOFF)
    }

    /// Create a controller with a custom request backoff.
    pub fn with_backoff(fabric: Arc<dyn RoutingFabric>, request_backoff: Duration) -> Self {
        Self {
            fabric,
            desired: Mutex::new(HashMap::new()),
            request_backoff,
        }
    }

    /// Mark `addr` as desired and refresh its activity timestamp.
    ///
    /// If no direct connection exists, requests one, at most once per
    /// backoff period. Never blocks on the fabric's connection attempt.
    pub fn set(&self, addr: &OverlayAddr) {
        let now = Instant::now();
        let connected = self.fabric.connection_to(addr).is_some();

        let should_request = {
            let mut desired = self.desired.lock();
            let entry = desired.entry(*addr).or_insert(Desire {
                last_active: now,
                last_request: None,
            });
            entry.last_active = now;

            let due = match entry.last_request {
                None => true,
                Some(at) => now.duration_since(at) >= self.request_backoff,
            };
            if !connected && due {
                entry.last_request = Some(now);
                true
            } else {
                false
            }
        };

        if should_request {
            debug!(addr = %addr, "Requesting on-demand connection");
            self.fabric.request_connection(addr);
        }
    }

    /// Check whether `addr` is currently desired.
    pub fn is_desired(&self, addr: &OverlayAddr) -> bool {
        self.desired.lock().contains_key(addr)
    }

    /// Snapshot of all desired addresses.
    pub fn desired(&self) -> Vec<OverlayAddr> {
        self.desired.lock().keys().copied().collect()
    }

    /// Number of desired addresses.
    pub fn len(&self) -> usize {
        self.desired.lock().len()
    }

    /// Check if nothing is desired.
    pub fn is_empty(&self) -> bool {
        self.desired.lock().is_empty()
    }

    /// Time since `addr` was last marked, if it is desired.
    pub fn idle_for(&self, addr: &OverlayAddr) -> Option<Duration> {
        self.desired
            .lock()
            .get(addr)
            .map(|d| Instant::now().duration_since(d.last_active))
    }

    /// Drop desire for `addr` and tell the fabric the connection may go.
    ///
    /// Returns false if the address was not desired.
    pub fn release(&self, addr: &OverlayAddr) -> bool {
        let removed = self.desired.lock().remove(addr).is_some();
        if removed {
            debug!(addr = %addr, "Releasing on-demand connection");
            self.fabric.release_connection(addr);
        }
        removed
    }

    /// Release every address idle for longer than `idle`.
    ///
    /// Returns the released addresses.
    pub fn release_idle(&self, idle: Duration) -> Vec<OverlayAddr> {
        let now = Instant::now();
        let expired: Vec<OverlayAddr> = {
            let mut desired = self.desired.lock();
            let expired: Vec<OverlayAddr> = desired
                .iter()
                .filter(|(_, d)| now.duration_since(d.last_active) > idle)
                .map(|(addr, _)| *addr)
                .collect();
            for addr in &expired {
                desired.remove(addr);
            }
            expired
        };

        for addr in &expired {
            self.fabric.release_connection(addr);
        }
        if !expired.is_empty() {
            trace!(count = expired.len(), "Released idle on-demand connections");
        }
        expired
    }
}
