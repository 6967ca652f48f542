//! Secure connection multiplexer.
//!
//! Every sender handed out or accepted is a security session. Sessions are
//! requested from the security layer per connection edge and installed
//! once they report ready; until then the session's own state transition
//! completes installation.

use super::{DEFAULT_READY_CAPACITY, Multiplexer, MuxCore, MuxError};
use crate::config::MuxConfig;
use crate::connection::{
    Connection, ConnectionEvent, ConnectionListener, DataHandler, RoutingFabric,
};
use crate::security::{SecurityLayer, SecuritySession, SessionListener, SessionState};
use crate::sender::{Sender, SenderId};
use crate::transport::Edge;
use crate::wire::ProtocolTag;
use crate::OverlayAddr;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Reason given to sessions closed because their connection went away.
pub const CONNECTION_CLOSED_REASON: &str = "connection closed";

/// Multiplexer that only speaks through security sessions.
pub struct SecureConnectionMux {
    core: MuxCore,
    security: Arc<dyn SecurityLayer>,
    this: Weak<SecureConnectionMux>,
}

impl SecureConnectionMux {
    /// Create a secure multiplexer for `tag` and register it with `fabric`.
    pub fn new(
        tag: ProtocolTag,
        fabric: Arc<dyn RoutingFabric>,
        security: Arc<dyn SecurityLayer>,
    ) -> Arc<Self> {
        Self::register(MuxCore::new(tag, fabric, DEFAULT_READY_CAPACITY), security)
    }

    /// Create a secure multiplexer from configuration.
    pub fn from_config(
        config: &MuxConfig,
        fabric: Arc<dyn RoutingFabric>,
        security: Arc<dyn SecurityLayer>,
    ) -> Result<Arc<Self>, MuxError> {
        Ok(Self::register(MuxCore::from_config(config, fabric)?, security))
    }

    fn register(core: MuxCore, security: Arc<dyn SecurityLayer>) -> Arc<Self> {
        let mux = Arc::new_cyclic(|this| Self {
            core,
            security,
            this: this.clone(),
        });
        let fabric = mux.core.fabric().clone();

        let weak = Arc::downgrade(&mux);
        let listener: Weak<dyn ConnectionListener> = weak.clone();
        fabric.subscribe(listener);
        let handler: Weak<dyn DataHandler> = weak;
        fabric.register_protocol(mux.core.tag().clone(), handler);

        debug!(tag = %mux.core.tag(), "Secure connection multiplexer registered");
        mux
    }

    /// Attach a security session to `con`'s current edge.
    ///
    /// Subscribes to the session the first time it is seen. Installs and
    /// returns it if it is already ready; otherwise returns `None` and the
    /// session's `Active` transition installs it later. A session that
    /// closed after reporting ready is never installed.
    pub fn secure_sender(&self, con: &Arc<Connection>) -> Option<Sender> {
        let session = self.security.create_session(&con.edge());
        self.track(&session);

        let state = session.state();
        if state.is_closed() {
            self.core.retire_session(None, session.id());
            return None;
        }
        if !state.is_ready() {
            trace!(session = %session.id(), addr = %con.addr(), state = %state, "Session not ready");
            return None;
        }

        let sender = Sender::Session(session);
        self.core
            .install_session(*con.addr(), sender.clone())
            .then_some(sender)
    }

    /// Subscribe to `session` the first time it is seen.
    fn track(&self, session: &Arc<dyn SecuritySession>) {
        if self.core.register_session(session.id()) {
            let listener: Weak<dyn SessionListener> = self.this.clone();
            session.subscribe(listener);
            trace!(session = %session.id(), "Subscribed to session");
        }
    }
}

impl Multiplexer for SecureConnectionMux {
    fn core(&self) -> &MuxCore {
        &self.core
    }

    fn sender_to_address(&self, sender: &Sender) -> Option<OverlayAddr> {
        let session = sender.as_session()?;
        self.core.connection_address(&session.underlying())
    }

    fn try_get_sender(&self, addr: &OverlayAddr) -> Option<Sender> {
        let con = self.core.structured_connection(addr)?;
        self.secure_sender(&con)
    }

    /// Resolve an inbound session to its address. Memoizes only while the
    /// session is still registered.
    fn get_address(&self, sender: &Sender) -> Option<OverlayAddr> {
        if let Some(addr) = self.core.address_for(&sender.id()) {
            return Some(addr);
        }
        let addr = self.sender_to_address(sender)?;
        self.core.install_session(addr, sender.clone());
        Some(addr)
    }

    /// Only sessions are accepted. Sessions first seen inbound are tracked
    /// so their closure unmaps them.
    fn accept_inbound(&self, return_path: &Sender) -> bool {
        match return_path.as_session() {
            Some(session) => {
                self.track(session);
                true
            }
            None => false,
        }
    }

    fn valid_connection(&self, con: &Arc<Connection>) {
        self.secure_sender(con);
    }

    /// Close the session for a lost connection. Map cleanup happens when
    /// the session reports `Closed`.
    fn valid_disconnection(&self, con: &Arc<Connection>) {
        let session = match self.core.sender_for(con.addr()) {
            Some(sender) => sender.as_session().cloned(),
            None => self.security.existing_session(con.edge().id()),
        };
        if let Some(session) = session {
            debug!(session = %session.id(), addr = %con.addr(), "Closing session for lost connection");
            session.close(CONNECTION_CLOSED_REASON);
        }
    }

    fn edge_replaced(&self, con: &Arc<Connection>, previous: &Arc<dyn Edge>) {
        if previous.id() == con.edge().id() {
            return;
        }
        if !self.core.ondemand().is_desired(con.addr()) {
            return;
        }
        debug!(addr = %con.addr(), previous = %previous.id(), "Edge replaced, reattaching session");
        self.secure_sender(con);
    }
}

impl SessionListener for SecureConnectionMux {
    fn on_session_state(&self, session: &Arc<dyn SecuritySession>, state: SessionState) {
        let sender = Sender::Session(session.clone());
        match state {
            SessionState::Active => {
                if let Some(addr) = self.sender_to_address(&sender) {
                    self.core.install_session(addr, sender);
                }
            }
            SessionState::Closed => {
                // The connection may already be gone from the table, so
                // prefer the reverse map.
                let addr = self
                    .core
                    .address_for(&SenderId::Session(session.id()))
                    .or_else(|| self.sender_to_address(&sender));
                self.core.retire_session(addr.as_ref(), session.id());
            }
            other => {
                trace!(session = %session.id(), state = %other, "Session state change");
            }
        }
    }
}

impl ConnectionListener for SecureConnectionMux {
    fn on_connection_event(&self, event: &ConnectionEvent) {
        self.handle_connection_event(event);
    }
}

impl DataHandler for SecureConnectionMux {
    fn handle_data(&self, frame: &[u8], return_path: Sender) {
        self.handle_inbound(frame, return_path);
    }
}
