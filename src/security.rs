//! Security Sessions
//!
//! A security session is an authenticated, encrypted channel bound to one
//! underlying edge. Handshake and record protection are the security
//! layer's business; multiplexers only watch session state and push
//! plaintext frames through ready sessions.

use crate::sender::Sender;
use crate::transport::{Edge, EdgeId, TransportError};
use std::fmt;
use std::sync::{Arc, Weak};

/// Unique identifier for a security session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new session ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Session lifecycle state.
///
/// ```text
/// Waiting ──► Active ◄──► Updating
///    │          │            │
///    └──────────┴────────────┴──► Closed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Handshake not yet complete.
    Waiting,
    /// Keys established; traffic may flow.
    Active,
    /// Re-keying in progress; traffic still flows on the current keys.
    Updating,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Check if the session can carry traffic.
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Updating)
    }

    /// Check if the session is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Waiting => "waiting",
            SessionState::Active => "active",
            SessionState::Updating => "updating",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Receives session state transitions.
///
/// Transitions for one session arrive in the order the session emits
/// them. Called synchronously from the security layer.
pub trait SessionListener: Send + Sync {
    fn on_session_state(&self, session: &Arc<dyn SecuritySession>, state: SessionState);
}

/// A cryptographic session layered over an underlying sender.
pub trait SecuritySession: Send + Sync + fmt::Debug {
    /// Stable identity of this session.
    fn id(&self) -> SessionId;

    /// Current state.
    fn state(&self) -> SessionState;

    /// The sender this session protects.
    fn underlying(&self) -> Sender;

    /// Protect and send a frame.
    fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Close the session. Idempotent; listeners see at most one `Closed`.
    fn close(&self, reason: &str);

    /// Register for state transitions. Dropped listeners are pruned.
    fn subscribe(&self, listener: Weak<dyn SessionListener>);
}

/// The session factory.
pub trait SecurityLayer: Send + Sync {
    /// Create a session over `edge`, or return the existing one.
    fn create_session(&self, edge: &Arc<dyn Edge>) -> Arc<dyn SecuritySession>;

    /// Return the session over `edge` without creating one.
    fn existing_session(&self, edge: EdgeId) -> Option<Arc<dyn SecuritySession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_properties() {
        assert!(!SessionState::Waiting.is_ready());
        assert!(SessionState::Active.is_ready());
        assert!(SessionState::Updating.is_ready());
        assert!(!SessionState::Closed.is_ready());

        assert!(SessionState::Closed.is_closed());
        assert!(!SessionState::Active.is_closed());
    }

    #[test]
    fn test_session_display() {
        assert_eq!(SessionId::new(4).to_string(), "session:4");
        assert_eq!(SessionState::Updating.to_string(), "updating");
    }
}
