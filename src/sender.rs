//! Senders
//!
//! Everything a multiplexer can push a frame into. The variant set is
//! closed; each variant carries a stable identity used as the reverse-map
//! key, so two wrappers around the same connection are the same sender.

use crate::connection::{Connection, ConnectionId};
use crate::security::{SecuritySession, SessionId};
use crate::transport::{Edge, EdgeId, TransportError};
use crate::OverlayAddr;
use std::fmt;
use std::sync::Arc;

/// Map-key identity of a sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SenderId {
    Edge(EdgeId),
    Routed(OverlayAddr),
    Connection(ConnectionId),
    Session(SessionId),
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderId::Edge(id) => write!(f, "{}", id),
            SenderId::Routed(addr) => write!(f, "routed:{}", addr),
            SenderId::Connection(id) => write!(f, "{}", id),
            SenderId::Session(id) => write!(f, "{}", id),
        }
    }
}

/// Delivers frames toward an overlay destination by multi-hop routing.
pub trait RouteSink: Send + Sync {
    fn route(&self, dest: &OverlayAddr, frame: &[u8]) -> Result<(), TransportError>;
}

/// Exact-address routed sender.
#[derive(Clone)]
pub struct RoutedSender {
    dest: OverlayAddr,
    sink: Arc<dyn RouteSink>,
}

impl RoutedSender {
    pub fn new(dest: OverlayAddr, sink: Arc<dyn RouteSink>) -> Self {
        Self { dest, sink }
    }

    /// The address this sender routes to.
    pub fn dest(&self) -> &OverlayAddr {
        &self.dest
    }

    pub fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        self.sink.route(&self.dest, frame)
    }
}

impl fmt::Debug for RoutedSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutedSender").field("dest", &self.dest).finish()
    }
}

/// Thin wrapper that forwards to a connection's current edge.
///
/// The edge is read at send time, so a wrapper stays valid across edge
/// replacement.
#[derive(Clone, Debug)]
pub struct ConnectionSender {
    connection: Arc<Connection>,
}

impl ConnectionSender {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        self.connection.edge().send(frame)
    }
}

/// A frame destination with a stable identity.
#[derive(Clone, Debug)]
pub enum Sender {
    /// A raw physical edge.
    Edge(Arc<dyn Edge>),
    /// An overlay-routed path to an exact address.
    Routed(RoutedSender),
    /// A connection wrapper.
    Connection(ConnectionSender),
    /// A security session over another sender.
    Session(Arc<dyn SecuritySession>),
}

impl Sender {
    /// Identity used as the reverse-map key.
    pub fn id(&self) -> SenderId {
        match self {
            Sender::Edge(edge) => SenderId::Edge(edge.id()),
            Sender::Routed(routed) => SenderId::Routed(*routed.dest()),
            Sender::Connection(cs) => SenderId::Connection(cs.connection().id()),
            Sender::Session(session) => SenderId::Session(session.id()),
        }
    }

    /// Push a frame.
    pub fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        match self {
            Sender::Edge(edge) => edge.send(frame),
            Sender::Routed(routed) => routed.send(frame),
            Sender::Connection(cs) => cs.send(frame),
            Sender::Session(session) => session.send(frame),
        }
    }

    /// The security session, if this sender is one.
    pub fn as_session(&self) -> Option<&Arc<dyn SecuritySession>> {
        match self {
            Sender::Session(session) => Some(session),
            _ => None,
        }
    }

    /// Check if this sender is a security session.
    pub fn is_session(&self) -> bool {
        matches!(self, Sender::Session(_))
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl From<Arc<dyn Edge>> for Sender {
    fn from(edge: Arc<dyn Edge>) -> Self {
        Sender::Edge(edge)
    }
}

impl From<Arc<dyn SecuritySession>> for Sender {
    fn from(session: Arc<dyn SecuritySession>) -> Self {
        Sender::Session(session)
    }
}

impl From<ConnectionSender> for Sender {
    fn from(cs: ConnectionSender) -> Self {
        Sender::Connection(cs)
    }
}
