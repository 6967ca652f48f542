//! Transport Edges
//!
//! An edge is a physical point-to-point link (a UDP or TCP socket pairing,
//! or an in-memory pipe in tests). Edges are owned by the routing fabric;
//! this crate only pushes bytes into them and uses their identity as a key.

use std::fmt;
use thiserror::Error;

/// Unique identifier for an edge instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(u64);

impl EdgeId {
    /// Create a new edge ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge:{}", self.0)
    }
}

/// Errors related to pushing bytes through a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("edge closed: {0}")]
    Closed(EdgeId),

    #[error("session closed")]
    SessionClosed,

    #[error("session not ready")]
    SessionNotReady,

    #[error("send failed: {0}")]
    SendFailed(String),
}

/// A physical link capable of carrying frames to one remote endpoint.
///
/// Implementations must be cheap to call from any thread; `send` never
/// waits for delivery.
pub trait Edge: Send + Sync + fmt::Debug {
    /// Stable identity of this edge.
    fn id(&self) -> EdgeId;

    /// Push a frame toward the remote endpoint.
    fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Whether the edge has been closed by its owner.
    fn is_closed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_id() {
        let id = EdgeId::new(12345);
        assert_eq!(id.as_u64(), 12345);
        assert_eq!(format!("{}", id), "edge:12345");
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Closed(EdgeId::new(7));
        assert_eq!(err.to_string(), "edge closed: edge:7");
    }
}
