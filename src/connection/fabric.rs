//! Routing fabric interface.
//!
//! The fabric owns the connection table and the overlay router. Consumers
//! register listeners for table transitions and handlers for tagged data.

use super::{Connection, ConnectionEvent};
use crate::sender::{RoutedSender, Sender};
use crate::transport::EdgeId;
use crate::wire::ProtocolTag;
use crate::OverlayAddr;
use std::sync::{Arc, Weak};

/// Receives connection-table transitions.
///
/// Called synchronously from the fabric's event dispatch. Implementations
/// must return promptly and must not block on other listeners.
pub trait ConnectionListener: Send + Sync {
    fn on_connection_event(&self, event: &ConnectionEvent);
}

/// Receives inbound frames for a registered protocol tag.
///
/// `frame` still carries the tag; `return_path` is whatever sender the
/// frame arrived on (an edge, a routed path, or a security session).
pub trait DataHandler: Send + Sync {
    fn handle_data(&self, frame: &[u8], return_path: Sender);
}

/// The overlay routing fabric as seen by a multiplexer.
pub trait RoutingFabric: Send + Sync {
    /// Current structured connection to `addr`, if any.
    fn connection_to(&self, addr: &OverlayAddr) -> Option<Arc<Connection>>;

    /// Connection currently carried by the given edge, if any.
    fn connection_for_edge(&self, edge: EdgeId) -> Option<Arc<Connection>>;

    /// A sender that routes to exactly `addr` through the overlay.
    fn routed_sender(&self, addr: &OverlayAddr) -> RoutedSender;

    /// Ask the fabric to establish a direct connection to `addr`.
    fn request_connection(&self, addr: &OverlayAddr);

    /// Tell the fabric a direct connection to `addr` is no longer wanted.
    fn release_connection(&self, addr: &OverlayAddr);

    /// Register a connection-table listener. Dropped listeners are pruned.
    fn subscribe(&self, listener: Weak<dyn ConnectionListener>);

    /// Route inbound frames carrying `tag` to `handler`.
    fn register_protocol(&self, tag: ProtocolTag, handler: Weak<dyn DataHandler>);
}
