//! DHT-backed address resolver.
//!
//! Two caches answer queries: `verified`, filled only by completed DHT
//! lookups, and `incoming`, filled by unverified claims seen on inbound
//! traffic. A verified answer always wins. Misses trigger at most one
//! lookup per key at a time, and a key that keeps missing is failed hard
//! once its attempt counter passes the cap.

use super::dht::{Dht, DhtError, LookupId, LookupResult};
use super::{AddressResolver, MissedMapping, ResolveError};
use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_STALENESS, TimedCache};
use crate::config::ResolverConfig;
use crate::OverlayAddr;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Tunables for a [`DhtResolver`].
#[derive(Clone, Debug)]
pub struct ResolverSettings {
    /// Namespace segment of the DHT key.
    pub namespace: String,
    /// Leading segment of the DHT key.
    pub key_prefix: String,
    /// Lookups issued per key before the next miss fails hard.
    pub max_attempts: u32,
    /// Last-touch age after which a sweep drops a cache entry.
    pub staleness: Duration,
    /// Period of the background sweep.
    pub sweep_interval: Duration,
    /// Age after which a verified hit schedules a re-lookup. `None` disables.
    pub refresh_after: Option<Duration>,
    /// Capacity of the missed-mapping broadcast channel.
    pub missed_capacity: usize,
    /// Maximum entries per cache.
    pub max_entries: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            key_prefix: "dhcp".to_string(),
            max_attempts: 2,
            staleness: DEFAULT_STALENESS,
            sweep_interval: DEFAULT_STALENESS,
            refresh_after: Some(Duration::from_secs(300)),
            missed_capacity: 256,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl From<&ResolverConfig> for ResolverSettings {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            namespace: config.namespace().to_string(),
            key_prefix: config.key_prefix().to_string(),
            max_attempts: config.max_attempts(),
            staleness: config.staleness(),
            sweep_interval: config.sweep_interval(),
            refresh_after: config.refresh_after(),
            missed_capacity: config.missed_channel_capacity(),
            max_entries: config.cache_size(),
        }
    }
}

struct ResolverState<K> {
    verified: TimedCache<K, OverlayAddr>,
    incoming: TimedCache<K, OverlayAddr>,
    /// Lookups issued per key since its last success or hard failure.
    attempts: HashMap<K, u32>,
    /// Keys with a lookup in flight.
    in_flight: HashSet<K>,
    /// Routes each completion back to its key.
    lookups: HashMap<LookupId, K>,
}

struct ResolverInner<K> {
    dht: Arc<dyn Dht>,
    settings: ResolverSettings,
    runtime: Handle,
    state: Mutex<ResolverState<K>>,
    missed_tx: broadcast::Sender<MissedMapping<K>>,
    next_lookup: AtomicU64,
}

/// Resolves keys through the DHT with verified and incoming caches.
pub struct DhtResolver<K> {
    inner: Arc<ResolverInner<K>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<K> DhtResolver<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    /// Create a resolver. Lookup completions and the sweeper run on `runtime`.
    pub fn new(dht: Arc<dyn Dht>, settings: ResolverSettings, runtime: Handle) -> Self {
        let (missed_tx, _) = broadcast::channel(settings.missed_capacity.max(1));
        let state = ResolverState {
            verified: TimedCache::new(settings.max_entries, settings.staleness),
            incoming: TimedCache::new(settings.max_entries, settings.staleness),
            attempts: HashMap::new(),
            in_flight: HashSet::new(),
            lookups: HashMap::new(),
        };
        Self {
            inner: Arc::new(ResolverInner {
                dht,
                settings,
                runtime,
                state: Mutex::new(state),
                missed_tx,
                next_lookup: AtomicU64::new(1),
            }),
            sweeper: Mutex::new(None),
        }
    }

    /// Create a resolver from configuration.
    pub fn from_config(dht: Arc<dyn Dht>, config: &ResolverConfig, runtime: Handle) -> Self {
        Self::new(dht, ResolverSettings::from(config), runtime)
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.inner.settings
    }

    /// DHT key under which `key`'s mapping is published.
    pub fn dht_key(&self, key: &K) -> String {
        self.inner.dht_key(key)
    }

    /// Verified answer for `key`, without touching it.
    pub fn verified(&self, key: &K) -> Option<OverlayAddr> {
        self.inner.state.lock().verified.peek(key).copied()
    }

    /// Unverified claim for `key`, without touching it.
    pub fn incoming(&self, key: &K) -> Option<OverlayAddr> {
        self.inner.state.lock().incoming.peek(key).copied()
    }

    /// Lookups issued for `key` since its last success or hard failure.
    pub fn attempts(&self, key: &K) -> u32 {
        self.inner.state.lock().attempts.get(key).copied().unwrap_or(0)
    }

    /// Check if a lookup for `key` is in flight.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inner.state.lock().in_flight.contains(key)
    }

    /// Number of lookups in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().lookups.len()
    }

    /// Drop stale entries from both caches. Returns the number dropped.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Start the periodic sweep. Replaces a running sweeper.
    pub fn spawn_sweeper(&self) {
        let inner = self.inner.clone();
        let period = self.inner.settings.sweep_interval;
        let handle = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                inner.sweep();
            }
        });
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the periodic sweep.
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            debug!("Resolver sweeper stopped");
        }
    }
}

impl<K> AddressResolver<K> for DhtResolver<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    /// Verified cache first, then incoming. An incoming hit or a clean miss
    /// starts a background lookup; so does a verified hit older than
    /// `refresh_after`. Returns immediately with whatever is cached.
    fn resolve(&self, key: &K) -> Result<Option<OverlayAddr>, ResolveError> {
        let now = Instant::now();
        let (addr, lookup) = {
            let mut state = self.inner.state.lock();
            let verified_age = state.verified.get_entry(key).map(|e| e.age(now));
            match verified_age {
                Some(age) => {
                    let refresh = self
                        .inner
                        .settings
                        .refresh_after
                        .is_some_and(|after| age >= after);
                    (state.verified.get_and_touch(key, now), refresh)
                }
                None => (state.incoming.get_and_touch(key, now), true),
            }
        };

        if lookup {
            ResolverInner::miss(&self.inner, key)?;
        }
        Ok(addr)
    }

    /// Trust-on-first-use: with no answer on record the claim is stored as
    /// unverified and accepted. A disagreeing answer is a mismatch.
    fn check(&self, key: &K, claimed: &OverlayAddr) -> Result<bool, ResolveError> {
        match self.resolve(key)? {
            Some(stored) if stored == *claimed => Ok(true),
            Some(stored) => Err(ResolveError::Mismatch {
                key: key.to_string(),
                expected: stored,
                claimed: *claimed,
            }),
            None => {
                self.inner
                    .state
                    .lock()
                    .incoming
                    .insert(key.clone(), *claimed, Instant::now());
                debug!(key = %key, addr = %claimed, "Accepted unverified mapping");
                Ok(true)
            }
        }
    }

    fn subscribe_missed(&self) -> broadcast::Receiver<MissedMapping<K>> {
        self.inner.missed_tx.subscribe()
    }
}

impl<K> Drop for DhtResolver<K> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

impl<K> ResolverInner<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    fn dht_key(&self, key: &K) -> String {
        format!(
            "{}:{}:{}",
            self.settings.key_prefix, self.settings.namespace, key
        )
    }

    /// Issue a lookup for `key` unless one is in flight.
    fn miss(this: &Arc<Self>, key: &K) -> Result<(), ResolveError> {
        let (id, attempt) = {
            let mut state = this.state.lock();
            if state.in_flight.contains(key) {
                return Ok(());
            }

            let attempt = state.attempts.get(key).copied().unwrap_or(0) + 1;
            if attempt > this.settings.max_attempts {
                state.attempts.remove(key);
                drop(state);
                info!(key = %key, "No address mapped, giving up");
                return Err(ResolveError::DoesNotExist {
                    key: key.to_string(),
                });
            }
            state.attempts.insert(key.clone(), attempt);

            let id = LookupId::new(this.next_lookup.fetch_add(1, Ordering::Relaxed));
            state.in_flight.insert(key.clone());
            state.lookups.insert(id, key.clone());
            (id, attempt)
        };

        let (tx, rx) = oneshot::channel();
        let dht_key = this.dht_key(key);
        debug!(key = %key, dht_key = %dht_key, attempt, lookup = %id, "Issuing DHT lookup");

        if let Err(e) = this.dht.async_get(dht_key.into_bytes(), tx) {
            warn!(key = %key, error = %e, "Failed to issue DHT lookup");
            let mut state = this.state.lock();
            state.in_flight.remove(key);
            state.lookups.remove(&id);
            return Ok(());
        }

        let inner = this.clone();
        this.runtime.spawn(async move {
            let result = rx.await.unwrap_or(Err(DhtError::Cancelled));
            inner.complete(id, result);
        });
        Ok(())
    }

    /// Route a lookup result back to its key.
    fn complete(&self, id: LookupId, result: LookupResult) {
        let addr = match result {
            Ok(records) => {
                let parsed = records.iter().find_map(|record| {
                    match std::str::from_utf8(&record.value)
                        .ok()
                        .and_then(|s| s.parse::<OverlayAddr>().ok())
                    {
                        Some(addr) => Some(addr),
                        None => {
                            debug!(lookup = %id, len = record.value.len(), "Malformed DHT record");
                            None
                        }
                    }
                });
                if records.is_empty() {
                    debug!(lookup = %id, "DHT lookup found no records");
                }
                parsed
            }
            Err(e) => {
                debug!(lookup = %id, error = %e, "DHT lookup failed");
                None
            }
        };

        let now = Instant::now();
        let (key, missed) = {
            let mut state = self.state.lock();
            let Some(key) = state.lookups.remove(&id) else {
                trace!(lookup = %id, "Completion for unknown lookup");
                return;
            };
            state.in_flight.remove(&key);

            let missed = match addr {
                Some(addr) => {
                    state.verified.insert(key.clone(), addr, now);
                    state.attempts.remove(&key);
                    None
                }
                None => state.incoming.peek(&key).map(|claimed| MissedMapping {
                    key: key.clone(),
                    addr: *claimed,
                }),
            };
            (key, missed)
        };

        match addr {
            Some(addr) => debug!(key = %key, addr = %addr, "Got result"),
            None => debug!(key = %key, "Failed to resolve"),
        }

        if let Some(missed) = missed {
            debug!(key = %key, addr = %missed.addr, "Missed mapping for unverified claim");
            // No subscribers is not an error.
            let _ = self.missed_tx.send(missed);
        }
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let (verified, incoming) = {
            let mut state = self.state.lock();
            (state.verified.purge_stale(now), state.incoming.purge_stale(now))
        };
        trace!(verified, incoming, "Swept resolver caches");
        verified + incoming
    }
}
