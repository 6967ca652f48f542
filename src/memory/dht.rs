//! In-memory DHT.

use crate::resolver::{Dht, DhtError, DhtRecord, LookupReply};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::trace;

#[derive(Default)]
struct DhtState {
    records: HashMap<Vec<u8>, Vec<DhtRecord>>,
    pending: Vec<(Vec<u8>, LookupReply)>,
}

/// Key-value store answering lookups from a local table.
///
/// Replies are immediate unless deferred, in which case they queue until
/// [`complete_pending`](Self::complete_pending) or
/// [`fail_pending`](Self::fail_pending).
#[derive(Default)]
pub struct MemoryDht {
    state: Mutex<DhtState>,
    deferred: AtomicBool,
    fail_issuance: AtomicBool,
    lookups: AtomicU64,
}

impl MemoryDht {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record under `key`.
    pub fn put(&self, key: impl Into<Vec<u8>>, record: DhtRecord) {
        self.state
            .lock()
            .records
            .entry(key.into())
            .or_default()
            .push(record);
    }

    /// Drop every record under `key`.
    pub fn remove(&self, key: &[u8]) -> usize {
        self.state
            .lock()
            .records
            .remove(key)
            .map_or(0, |records| records.len())
    }

    /// Queue replies instead of answering immediately.
    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.store(deferred, Ordering::Relaxed);
    }

    /// Refuse to issue lookups.
    pub fn set_fail_issuance(&self, fail: bool) {
        self.fail_issuance.store(fail, Ordering::Relaxed);
    }

    /// Answer queued lookups from the current table. Returns how many.
    pub fn complete_pending(&self) -> usize {
        let (pending, answers): (Vec<_>, Vec<_>) = {
            let mut state = self.state.lock();
            let pending = std::mem::take(&mut state.pending);
            let answers = pending
                .iter()
                .map(|(key, _)| state.records.get(key).cloned().unwrap_or_default())
                .collect();
            (pending, answers)
        };
        let count = pending.len();
        for ((_, reply), records) in pending.into_iter().zip(answers) {
            let _ = reply.send(Ok(records));
        }
        count
    }

    /// Fail queued lookups with `error`. Returns how many.
    pub fn fail_pending(&self, error: DhtError) -> usize {
        let pending = std::mem::take(&mut self.state.lock().pending);
        let count = pending.len();
        for (_, reply) in pending {
            let _ = reply.send(Err(error.clone()));
        }
        count
    }

    /// Lookups issued so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl Dht for MemoryDht {
    fn async_get(&self, key: Vec<u8>, reply: LookupReply) -> Result<(), DhtError> {
        if self.fail_issuance.load(Ordering::Relaxed) {
            return Err(DhtError::Unavailable);
        }
        self.lookups.fetch_add(1, Ordering::Relaxed);
        trace!(key = %String::from_utf8_lossy(&key), "DHT get");

        let mut state = self.state.lock();
        if self.deferred.load(Ordering::Relaxed) {
            state.pending.push((key, reply));
            return Ok(());
        }
        let records = state.records.get(&key).cloned().unwrap_or_default();
        drop(state);
        let _ = reply.send(Ok(records));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn test_immediate_reply() {
        let dht = MemoryDht::new();
        dht.put("k", DhtRecord::new("v", 60));

        let (tx, mut rx) = oneshot::channel();
        dht.async_get(b"k".to_vec(), tx).unwrap();
        let records = rx.try_recv().unwrap().unwrap();
        assert_eq!(records, vec![DhtRecord::new("v", 60)]);
        assert_eq!(dht.lookups(), 1);
    }

    #[test]
    fn test_deferred_reply() {
        let dht = MemoryDht::new();
        dht.set_deferred(true);

        let (tx, mut rx) = oneshot::channel();
        dht.async_get(b"k".to_vec(), tx).unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(dht.pending_count(), 1);

        dht.put("k", DhtRecord::new("late", 60));
        assert_eq!(dht.complete_pending(), 1);
        assert_eq!(rx.try_recv().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_fail_pending_and_issuance() {
        let dht = MemoryDht::new();
        dht.set_deferred(true);
        let (tx, mut rx) = oneshot::channel();
        dht.async_get(b"k".to_vec(), tx).unwrap();
        assert_eq!(dht.fail_pending(DhtError::Failed("timeout".into())), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(DhtError::Failed("timeout".into()))
        );

        dht.set_fail_issuance(true);
        let (tx, _rx) = oneshot::channel();
        assert_eq!(dht.async_get(b"k".to_vec(), tx), Err(DhtError::Unavailable));
        assert_eq!(dht.lookups(), 1);
    }

    #[test]
    fn test_remove() {
        let dht = MemoryDht::new();
        dht.put("k", DhtRecord::new("a", 1));
        dht.put("k", DhtRecord::new("b", 1));
        assert_eq!(dht.remove(b"k"), 2);
        assert_eq!(dht.remove(b"k"), 0);
    }
}
