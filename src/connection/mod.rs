//! Overlay Connections
//!
//! A connection is an established overlay-level neighbor relationship. It
//! belongs to the routing fabric's connection table; this crate observes
//! connections appearing, disappearing, and having their underlying edge
//! replaced, but never creates or destroys one.

mod fabric;

pub use fabric::{ConnectionListener, DataHandler, RoutingFabric};

use crate::transport::Edge;
use crate::OverlayAddr;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a connection instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "con:{}", self.0)
    }
}

/// Connection classification in the connection table.
///
/// Only structured connections participate in multiplexing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    /// Ring/shortcut connection in the structured address space.
    Structured,
    /// Bootstrap connection to a leaf.
    Leaf,
    /// Random unstructured connection.
    Unstructured,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionType::Structured => "structured",
            ConnectionType::Leaf => "leaf",
            ConnectionType::Unstructured => "unstructured",
        };
        write!(f, "{}", s)
    }
}

/// An established link to an overlay neighbor.
///
/// The address and type are fixed for the connection's lifetime; the
/// physical edge may be swapped out underneath it.
pub struct Connection {
    id: ConnectionId,
    addr: OverlayAddr,
    conn_type: ConnectionType,
    /// Current physical link.
    edge: RwLock<Arc<dyn Edge>>,
}

impl Connection {
    /// Create a new connection over `edge`.
    pub fn new(
        id: ConnectionId,
        addr: OverlayAddr,
        conn_type: ConnectionType,
        edge: Arc<dyn Edge>,
    ) -> Self {
        Self {
            id,
            addr,
            conn_type,
            edge: RwLock::new(edge),
        }
    }

    /// Get the connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the remote overlay address.
    pub fn addr(&self) -> &OverlayAddr {
        &self.addr
    }

    /// Get the connection type.
    pub fn conn_type(&self) -> ConnectionType {
        self.conn_type
    }

    /// Check if this is a structured connection.
    pub fn is_structured(&self) -> bool {
        self.conn_type == ConnectionType::Structured
    }

    /// Get the current edge.
    pub fn edge(&self) -> Arc<dyn Edge> {
        self.edge.read().clone()
    }

    /// Replace the underlying edge, returning the previous one.
    pub fn replace_edge(&self, edge: Arc<dyn Edge>) -> Arc<dyn Edge> {
        std::mem::replace(&mut *self.edge.write(), edge)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("type", &self.conn_type)
            .field("edge", &self.edge.read().id())
            .finish()
    }
}

/// Connection-table transitions delivered to listeners.
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    /// A connection was added to the table.
    Connected(Arc<Connection>),
    /// A connection was removed from the table.
    Disconnected(Arc<Connection>),
    /// The connection's edge was replaced; its address is unchanged.
    EdgeReplaced {
        connection: Arc<Connection>,
        previous: Arc<dyn Edge>,
    },
}

impl ConnectionEvent {
    /// The connection this event concerns.
    pub fn connection(&self) -> &Arc<Connection> {
        match self {
            ConnectionEvent::Connected(con) => con,
            ConnectionEvent::Disconnected(con) => con,
            ConnectionEvent::EdgeReplaced { connection, .. } => connection,
        }
    }
}
