//! In-memory security layer.
//!
//! Sessions carry frames in the clear over their edge. Handshake completion
//! is driven by the test or simulator through [`MemorySecurity::activate`],
//! or immediately when auto-activation is on.

use crate::security::{SecurityLayer, SecuritySession, SessionId, SessionListener, SessionState};
use crate::sender::Sender;
use crate::transport::{Edge, EdgeId, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// A session bound to one edge.
pub struct MemorySession {
    id: SessionId,
    this: Weak<MemorySession>,
    edge: Arc<dyn Edge>,
    state: Mutex<SessionState>,
    listeners: Mutex<Vec<Weak<dyn SessionListener>>>,
    close_reason: Mutex<Option<String>>,
}

impl MemorySession {
    fn new(id: SessionId, edge: Arc<dyn Edge>, state: SessionState) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            this: this.clone(),
            edge,
            state: Mutex::new(state),
            listeners: Mutex::new(Vec::new()),
            close_reason: Mutex::new(None),
        })
    }

    /// Move to `next` and notify listeners.
    ///
    /// Closed is terminal; repeating the current state is a no-op. Returns
    /// whether the state changed.
    pub fn transition(&self, next: SessionState) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_closed() || *state == next {
                return false;
            }
            *state = next;
        }
        trace!(session = %self.id, state = %next, "Session transition");

        let Some(this) = self.this.upgrade() else {
            return true;
        };
        let this: Arc<dyn SecuritySession> = this;
        let listeners: Vec<Arc<dyn SessionListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_session_state(&this, next);
        }
        true
    }

    /// Reason passed to `close`, if closed that way.
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().clone()
    }

    /// Number of live subscribers.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    pub fn edge_id(&self) -> EdgeId {
        self.edge.id()
    }
}

impl SecuritySession for MemorySession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn underlying(&self) -> Sender {
        Sender::Edge(self.edge.clone())
    }

    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        match self.state() {
            SessionState::Closed => Err(TransportError::SessionClosed),
            SessionState::Waiting => Err(TransportError::SessionNotReady),
            SessionState::Active | SessionState::Updating => self.edge.send(frame),
        }
    }

    fn close(&self, reason: &str) {
        {
            let mut close_reason = self.close_reason.lock();
            if close_reason.is_none() && !self.state().is_closed() {
                *close_reason = Some(reason.to_string());
            }
        }
        self.transition(SessionState::Closed);
    }

    fn subscribe(&self, listener: Weak<dyn SessionListener>) {
        self.listeners.lock().push(listener);
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("edge", &self.edge.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Session factory keyed by edge.
pub struct MemorySecurity {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<EdgeId, Arc<MemorySession>>>,
    auto_activate: bool,
    created: AtomicU64,
}

impl MemorySecurity {
    /// Sessions start `Waiting` until activated.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    /// Sessions are `Active` on creation, and inbound frames on an edge
    /// without a session create one.
    pub fn with_auto_activate() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    fn build(auto_activate: bool) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            auto_activate,
            created: AtomicU64::new(0),
        }
    }

    /// Open session on `edge`, if any.
    pub fn session(&self, edge: EdgeId) -> Option<Arc<MemorySession>> {
        self.sessions
            .lock()
            .get(&edge)
            .filter(|s| !s.state().is_closed())
            .cloned()
    }

    /// Complete the handshake on `edge`'s session.
    pub fn activate(&self, edge: EdgeId) -> bool {
        self.session(edge)
            .is_some_and(|s| s.transition(SessionState::Active))
    }

    /// Start re-keying on `edge`'s session.
    pub fn begin_update(&self, edge: EdgeId) -> bool {
        self.session(edge)
            .is_some_and(|s| s.transition(SessionState::Updating))
    }

    /// Close `edge`'s session.
    pub fn close(&self, edge: EdgeId, reason: &str) -> bool {
        match self.session(edge) {
            Some(session) => {
                session.close(reason);
                true
            }
            None => false,
        }
    }

    /// Total sessions created.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Session for an inbound frame on `edge`.
    pub fn accept(&self, edge: &Arc<dyn Edge>) -> Option<Arc<dyn SecuritySession>> {
        if self.auto_activate {
            Some(self.create_session(edge))
        } else {
            self.existing_session(edge.id())
        }
    }
}

impl SecurityLayer for MemorySecurity {
    fn create_session(&self, edge: &Arc<dyn Edge>) -> Arc<dyn SecuritySession> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&edge.id())
            && !existing.state().is_closed()
        {
            return existing.clone();
        }

        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let initial = if self.auto_activate {
            SessionState::Active
        } else {
            SessionState::Waiting
        };
        let session = MemorySession::new(id, edge.clone(), initial);
        sessions.insert(edge.id(), session.clone());
        self.created.fetch_add(1, Ordering::Relaxed);
        trace!(session = %id, edge = %edge.id(), state = %initial, "Session created");
        session
    }

    fn existing_session(&self, edge: EdgeId) -> Option<Arc<dyn SecuritySession>> {
        let session: Arc<dyn SecuritySession> = self.session(edge)?;
        Some(session)
    }
}
