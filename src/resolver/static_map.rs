//! Statically provisioned resolver.
//!
//! A bidirectional key↔address table administered out of band. Nothing is
//! discovered, so `check` is strict: both directions must agree.

use super::{AddressResolver, MissedMapping, ResolveError};
use crate::OverlayAddr;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tokio::sync::broadcast;
use tracing::debug;

struct StaticState<K> {
    by_key: HashMap<K, OverlayAddr>,
    by_addr: HashMap<OverlayAddr, K>,
    /// Successful resolutions per address.
    resolved: HashMap<OverlayAddr, u64>,
}

/// Resolver backed by a fixed mapping table.
pub struct StaticResolver<K> {
    state: Mutex<StaticState<K>>,
    missed_tx: broadcast::Sender<MissedMapping<K>>,
}

impl<K> StaticResolver<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync,
{
    pub fn new() -> Self {
        let (missed_tx, _) = broadcast::channel(1);
        Self {
            state: Mutex::new(StaticState {
                by_key: HashMap::new(),
                by_addr: HashMap::new(),
                resolved: HashMap::new(),
            }),
            missed_tx,
        }
    }

    /// Map `key` to `addr`. Fails if either side is already mapped.
    pub fn add_mapping(&self, key: K, addr: OverlayAddr) -> Result<(), ResolveError> {
        let mut state = self.state.lock();
        if state.by_key.contains_key(&key) || state.by_addr.contains_key(&addr) {
            return Err(ResolveError::AlreadyMapped {
                key: key.to_string(),
                addr,
            });
        }
        debug!(key = %key, addr = %addr, "Added static mapping");
        state.by_key.insert(key.clone(), addr);
        state.by_addr.insert(addr, key);
        Ok(())
    }

    /// Remove the mapping for `key`, returning its address.
    pub fn remove_mapping(&self, key: &K) -> Option<OverlayAddr> {
        let mut state = self.state.lock();
        let addr = state.by_key.remove(key)?;
        state.by_addr.remove(&addr);
        state.resolved.remove(&addr);
        debug!(key = %key, addr = %addr, "Removed static mapping");
        Some(addr)
    }

    /// Key mapped to `addr`, if any.
    pub fn key_for(&self, addr: &OverlayAddr) -> Option<K> {
        self.state.lock().by_addr.get(addr).cloned()
    }

    /// Snapshot of all mappings.
    pub fn mappings(&self) -> Vec<(K, OverlayAddr)> {
        self.state
            .lock()
            .by_key
            .iter()
            .map(|(k, a)| (k.clone(), *a))
            .collect()
    }

    /// Number of successful resolutions to `addr`.
    pub fn resolve_count(&self, addr: &OverlayAddr) -> u64 {
        self.state.lock().resolved.get(addr).copied().unwrap_or(0)
    }
}

impl<K> Default for StaticResolver<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> AddressResolver<K> for StaticResolver<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync,
{
    fn resolve(&self, key: &K) -> Result<Option<OverlayAddr>, ResolveError> {
        let mut state = self.state.lock();
        let addr = state.by_key.get(key).copied();
        if let Some(addr) = addr {
            *state.resolved.entry(addr).or_insert(0) += 1;
        }
        Ok(addr)
    }

    fn check(&self, key: &K, claimed: &OverlayAddr) -> Result<bool, ResolveError> {
        let state = self.state.lock();
        let forward = state.by_key.get(key) == Some(claimed);
        let reverse = state.by_addr.get(claimed) == Some(key);
        Ok(forward && reverse)
    }

    /// Static tables never miss; the receiver never yields.
    fn subscribe_missed(&self) -> broadcast::Receiver<MissedMapping<K>> {
        self.missed_tx.subscribe()
    }
}
