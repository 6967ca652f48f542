//! In-memory routing fabric: one node's connection table.

use super::edge::MemoryEdge;
use super::network::MemoryNetwork;
use super::security::MemorySecurity;
use super::{next_connection_id, next_edge_id};
use crate::connection::{
    Connection, ConnectionEvent, ConnectionListener, ConnectionType, DataHandler, RoutingFabric,
};
use crate::sender::{RouteSink, RoutedSender, Sender};
use crate::transport::{Edge, EdgeId, TransportError};
use crate::wire::ProtocolTag;
use crate::OverlayAddr;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::trace;

#[derive(Default)]
struct FabricState {
    connections: HashMap<OverlayAddr, Arc<Connection>>,
    edges: HashMap<EdgeId, Arc<dyn Edge>>,
    listeners: Vec<Weak<dyn ConnectionListener>>,
    protocols: Vec<(ProtocolTag, Weak<dyn DataHandler>)>,
    requested: Vec<OverlayAddr>,
    released: Vec<OverlayAddr>,
}

/// Routed delivery for one node.
struct MemoryRouter {
    origin: OverlayAddr,
    network: RwLock<Weak<MemoryNetwork>>,
    routed: Mutex<Vec<(OverlayAddr, Vec<u8>)>>,
}

impl RouteSink for MemoryRouter {
    fn route(&self, dest: &OverlayAddr, frame: &[u8]) -> Result<(), TransportError> {
        self.routed.lock().push((*dest, frame.to_vec()));
        let network = self.network.read().upgrade();
        match network {
            Some(network) => network.route(&self.origin, dest, frame),
            None => Ok(()),
        }
    }
}

/// A node's connection table and protocol dispatch.
pub struct MemoryFabric {
    local: OverlayAddr,
    state: Mutex<FabricState>,
    router: Arc<MemoryRouter>,
    security: RwLock<Option<Arc<MemorySecurity>>>,
    network: RwLock<Weak<MemoryNetwork>>,
}

impl MemoryFabric {
    /// Create a standalone fabric for the node at `local`.
    pub fn new(local: OverlayAddr) -> Arc<Self> {
        Arc::new(Self {
            local,
            state: Mutex::new(FabricState::default()),
            router: Arc::new(MemoryRouter {
                origin: local,
                network: RwLock::new(Weak::new()),
                routed: Mutex::new(Vec::new()),
            }),
            security: RwLock::new(None),
            network: RwLock::new(Weak::new()),
        })
    }

    pub fn local_addr(&self) -> &OverlayAddr {
        &self.local
    }

    pub(crate) fn set_network(&self, network: Weak<MemoryNetwork>) {
        *self.router.network.write() = network.clone();
        *self.network.write() = network;
    }

    /// Inbound frames on edges with a ready session arrive through it.
    pub fn set_security(&self, security: Arc<MemorySecurity>) {
        *self.security.write() = Some(security);
    }

    // === Connection Table ===

    /// Add a structured connection to `addr` over a fresh detached edge.
    pub fn attach(&self, addr: OverlayAddr) -> Arc<Connection> {
        let edge = MemoryEdge::detached(next_edge_id().as_u64());
        self.attach_with(addr, ConnectionType::Structured, edge)
    }

    /// Add a connection over `edge`, replacing any connection to `addr`.
    pub fn attach_with(
        &self,
        addr: OverlayAddr,
        conn_type: ConnectionType,
        edge: Arc<dyn Edge>,
    ) -> Arc<Connection> {
        let con = Arc::new(Connection::new(next_connection_id(), addr, conn_type, edge.clone()));
        let replaced = {
            let mut state = self.state.lock();
            state.edges.insert(edge.id(), edge);
            let replaced = state.connections.insert(addr, con.clone());
            if let Some(old) = &replaced {
                state.edges.remove(&old.edge().id());
            }
            replaced
        };

        if let Some(old) = replaced {
            self.fire(ConnectionEvent::Disconnected(old));
        }
        trace!(local = %self.local, addr = %addr, con = %con.id(), "Connection attached");
        self.fire(ConnectionEvent::Connected(con.clone()));
        con
    }

    /// Remove the connection to `addr`.
    pub fn detach(&self, addr: &OverlayAddr) -> Option<Arc<Connection>> {
        let con = {
            let mut state = self.state.lock();
            let con = state.connections.remove(addr)?;
            state.edges.remove(&con.edge().id());
            con
        };
        trace!(local = %self.local, addr = %addr, con = %con.id(), "Connection detached");
        self.fire(ConnectionEvent::Disconnected(con.clone()));
        Some(con)
    }

    /// Replace the edge under the connection to `addr`.
    pub fn swap_edge(&self, addr: &OverlayAddr, edge: Arc<dyn Edge>) -> Option<Arc<dyn Edge>> {
        let (con, previous) = {
            let mut state = self.state.lock();
            let con = state.connections.get(addr)?.clone();
            let previous = con.replace_edge(edge.clone());
            state.edges.remove(&previous.id());
            state.edges.insert(edge.id(), edge);
            (con, previous)
        };
        self.fire(ConnectionEvent::EdgeReplaced {
            connection: con,
            previous: previous.clone(),
        });
        Some(previous)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    fn fire(&self, event: ConnectionEvent) {
        let listeners: Vec<Arc<dyn ConnectionListener>> = {
            let mut state = self.state.lock();
            state.listeners.retain(|l| l.strong_count() > 0);
            state.listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_connection_event(&event);
        }
    }

    // === Dispatch ===

    /// Deliver a frame that arrived on `edge`.
    ///
    /// Returns the number of handlers that received it.
    pub fn deliver(&self, frame: &[u8], edge: EdgeId) -> usize {
        let edge = self.state.lock().edges.get(&edge).cloned();
        let Some(edge) = edge else {
            trace!(local = %self.local, "Frame on unknown edge dropped");
            return 0;
        };

        let security = self.security.read().clone();
        let session = security.and_then(|s| s.accept(&edge));
        let return_path = match session {
            Some(session) if session.state().is_ready() => Sender::Session(session),
            _ => Sender::Edge(edge),
        };
        self.deliver_from(frame, return_path)
    }

    /// Deliver a frame with an explicit return path.
    pub fn deliver_from(&self, frame: &[u8], return_path: Sender) -> usize {
        let handlers: Vec<Arc<dyn DataHandler>> = {
            let mut state = self.state.lock();
            state.protocols.retain(|(_, h)| h.strong_count() > 0);
            state
                .protocols
                .iter()
                .filter(|(tag, _)| tag.matches(frame))
                .filter_map(|(_, h)| h.upgrade())
                .collect()
        };
        for handler in &handlers {
            handler.handle_data(frame, return_path.clone());
        }
        handlers.len()
    }

    // === Recorded Requests ===

    /// Addresses passed to `request_connection`, in order.
    pub fn requested(&self) -> Vec<OverlayAddr> {
        self.state.lock().requested.clone()
    }

    /// Addresses passed to `release_connection`, in order.
    pub fn released(&self) -> Vec<OverlayAddr> {
        self.state.lock().released.clone()
    }

    /// Frames pushed through routed senders.
    pub fn routed(&self) -> Vec<(OverlayAddr, Vec<u8>)> {
        self.router.routed.lock().clone()
    }
}

impl RoutingFabric for MemoryFabric {
    fn connection_to(&self, addr: &OverlayAddr) -> Option<Arc<Connection>> {
        self.state.lock().connections.get(addr).cloned()
    }

    fn connection_for_edge(&self, edge: EdgeId) -> Option<Arc<Connection>> {
        self.state
            .lock()
            .connections
            .values()
            .find(|con| con.edge().id() == edge)
            .cloned()
    }

    fn routed_sender(&self, addr: &OverlayAddr) -> RoutedSender {
        let sink: Arc<dyn RouteSink> = self.router.clone();
        RoutedSender::new(*addr, sink)
    }

    fn request_connection(&self, addr: &OverlayAddr) {
        self.state.lock().requested.push(*addr);
        let network = self.network.read().upgrade();
        if let Some(network) = network {
            network.connect(&self.local, addr);
        }
    }

    fn release_connection(&self, addr: &OverlayAddr) {
        self.state.lock().released.push(*addr);
        let network = self.network.read().upgrade();
        if let Some(network) = network {
            network.disconnect(&self.local, addr);
        }
    }

    fn subscribe(&self, listener: Weak<dyn ConnectionListener>) {
        self.state.lock().listeners.push(listener);
    }

    fn register_protocol(&self, tag: ProtocolTag, handler: Weak<dyn DataHandler>) {
        self.state.lock().protocols.push((tag, handler));
    }
}
