//! In-memory overlay: a set of fabrics joined by paired edges.

use super::edge::MemoryEdge;
use super::fabric::MemoryFabric;
use super::next_edge_id;
use crate::connection::{ConnectionType, RoutingFabric};
use crate::sender::Sender;
use crate::transport::TransportError;
use crate::OverlayAddr;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Links fabrics so that a connection request on one node creates the
/// connection on both ends.
pub struct MemoryNetwork {
    this: Weak<MemoryNetwork>,
    nodes: Mutex<HashMap<OverlayAddr, Arc<MemoryFabric>>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            nodes: Mutex::new(HashMap::new()),
        })
    }

    /// Add a node and return its fabric.
    pub fn add_node(&self, addr: OverlayAddr) -> Arc<MemoryFabric> {
        let fabric = MemoryFabric::new(addr);
        fabric.set_network(self.this.clone());
        self.nodes.lock().insert(addr, fabric.clone());
        fabric
    }

    pub fn node(&self, addr: &OverlayAddr) -> Option<Arc<MemoryFabric>> {
        self.nodes.lock().get(addr).cloned()
    }

    /// Addresses of all nodes.
    pub fn addrs(&self) -> Vec<OverlayAddr> {
        self.nodes.lock().keys().copied().collect()
    }

    /// Connect `a` and `b` with a fresh edge pair.
    ///
    /// Returns false if either node is unknown or they are already
    /// connected.
    pub fn connect(&self, a: &OverlayAddr, b: &OverlayAddr) -> bool {
        let (Some(fa), Some(fb)) = (self.node(a), self.node(b)) else {
            return false;
        };
        if a == b || fa.connection_to(b).is_some() {
            return false;
        }

        let id_a = next_edge_id();
        let id_b = next_edge_id();
        let edge_a = MemoryEdge::linked(id_a, Arc::downgrade(&fb), id_b);
        let edge_b = MemoryEdge::linked(id_b, Arc::downgrade(&fa), id_a);

        debug!(a = %a, b = %b, "Connecting nodes");
        fa.attach_with(*b, ConnectionType::Structured, edge_a);
        fb.attach_with(*a, ConnectionType::Structured, edge_b);
        true
    }

    /// Tear down the connection between `a` and `b` on both ends.
    pub fn disconnect(&self, a: &OverlayAddr, b: &OverlayAddr) -> bool {
        let (Some(fa), Some(fb)) = (self.node(a), self.node(b)) else {
            return false;
        };
        let removed_a = fa.detach(b).is_some();
        let removed_b = fb.detach(a).is_some();
        removed_a || removed_b
    }

    /// Deliver a routed frame from `from` to `to`.
    pub fn route(
        &self,
        from: &OverlayAddr,
        to: &OverlayAddr,
        frame: &[u8],
    ) -> Result<(), TransportError> {
        let Some(dest) = self.node(to) else {
            return Err(TransportError::SendFailed(format!("no route to {}", to)));
        };
        let return_path = Sender::Routed(dest.routed_sender(from));
        dest.deliver_from(frame, return_path);
        Ok(())
    }
}
