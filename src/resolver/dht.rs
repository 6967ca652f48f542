//! Distributed hash table interface.

use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors from issuing or completing a DHT lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DhtError {
    #[error("dht unavailable")]
    Unavailable,

    #[error("dht lookup failed: {0}")]
    Failed(String),

    #[error("dht lookup cancelled")]
    Cancelled,
}

/// A value stored under a DHT key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DhtRecord {
    pub value: Vec<u8>,
    /// Remaining lifetime in seconds, as reported by the store.
    pub ttl_secs: u32,
}

impl DhtRecord {
    pub fn new(value: impl Into<Vec<u8>>, ttl_secs: u32) -> Self {
        Self {
            value: value.into(),
            ttl_secs,
        }
    }
}

/// Completed lookup: every record under the key, possibly none.
pub type LookupResult = Result<Vec<DhtRecord>, DhtError>;

/// Single-use completion channel for a lookup.
pub type LookupReply = oneshot::Sender<LookupResult>;

/// Identity of one issued lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LookupId(u64);

impl LookupId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LookupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lookup:{}", self.0)
    }
}

/// Asynchronous get-by-key against the DHT.
pub trait Dht: Send + Sync {
    /// Start a lookup. The result arrives on `reply`; an `Err` here means
    /// the lookup was never issued and `reply` has been dropped.
    fn async_get(&self, key: Vec<u8>, reply: LookupReply) -> Result<(), DhtError>;
}
