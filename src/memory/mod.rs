//! In-Memory Collaborators
//!
//! Process-local implementations of the fabric, edge, security layer and
//! DHT interfaces. A [`MemoryNetwork`] joins several [`MemoryFabric`]s so
//! that frames sent on one node arrive on another, which is enough to run
//! multiplexers and resolvers end to end without sockets.

mod dht;
mod edge;
mod fabric;
mod network;
mod security;

pub use dht::MemoryDht;
pub use edge::MemoryEdge;
pub use fabric::MemoryFabric;
pub use network::MemoryNetwork;
pub use security::{MemorySecurity, MemorySession};

use crate::connection::ConnectionId;
use crate::transport::EdgeId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Edge ids handed out internally start here so they never collide with the
/// small literal ids used by callers of [`MemoryEdge::detached`].
static NEXT_EDGE_ID: AtomicU64 = AtomicU64::new(1000);
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_edge_id() -> EdgeId {
    EdgeId::new(NEXT_EDGE_ID.fetch_add(1, Ordering::Relaxed))
}

pub(crate) fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}
