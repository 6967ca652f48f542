//! Address Resolution
//!
//! Maps external identifiers (typically IP addresses) to overlay
//! addresses. [`DhtResolver`] discovers mappings through the distributed
//! hash table with a two-tier cache; [`StaticResolver`] serves mappings
//! provisioned out of band.

mod dht;
mod dht_resolver;
mod static_map;


pub use dht::{Dht, DhtError, DhtRecord, LookupId, LookupReply, LookupResult};
pub use dht_resolver::{DhtResolver, ResolverSettings};
pub use static_map::StaticResolver;

use crate::OverlayAddr;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors surfaced to the layer that asked for a resolution.
///
/// Transport and lookup faults are not errors here; they show up as an
/// absent answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("address mismatch for {key}: expected {expected}, got {claimed}")]
    Mismatch {
        key: String,
        expected: OverlayAddr,
        claimed: OverlayAddr,
    },

    #[error("no address mapped to {key}")]
    DoesNotExist { key: String },

    #[error("already mapped: {key} / {addr}")]
    AlreadyMapped { key: String, addr: OverlayAddr },
}

impl ResolveError {
    /// Check if this error is a mismatch.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, ResolveError::Mismatch { .. })
    }

    /// Check if this error means the key has no mapping.
    pub fn is_does_not_exist(&self) -> bool {
        matches!(self, ResolveError::DoesNotExist { .. })
    }
}

/// A lookup failed while an unverified claim for the key was on record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissedMapping<K> {
    pub key: K,
    /// The claimed, unverified address.
    pub addr: OverlayAddr,
}

/// Resolution of external keys to overlay addresses.
pub trait AddressResolver<K>: Send + Sync {
    /// Current answer for `key`. Never waits for the network.
    fn resolve(&self, key: &K) -> Result<Option<OverlayAddr>, ResolveError>;

    /// Validate that `claimed` is the address behind `key`.
    fn check(&self, key: &K, claimed: &OverlayAddr) -> Result<bool, ResolveError>;

    /// Subscribe to missed-mapping notifications.
    fn subscribe_missed(&self) -> broadcast::Receiver<MissedMapping<K>>;
}
