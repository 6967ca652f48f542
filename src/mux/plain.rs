//! Plain connection multiplexer.

use super::{DEFAULT_READY_CAPACITY, Multiplexer, MuxCore, MuxError};
use crate::config::MuxConfig;
use crate::connection::{ConnectionEvent, ConnectionListener, DataHandler, RoutingFabric};
use crate::sender::Sender;
use crate::wire::ProtocolTag;
use crate::OverlayAddr;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Multiplexer handing out connection wrappers.
///
/// Inbound frames are accepted from any sender the connection table can
/// place: connection wrappers, edges, and routed paths.
pub struct ConnectionMux {
    core: MuxCore,
}

impl ConnectionMux {
    /// Create a multiplexer for `tag` and register it with `fabric`.
    pub fn new(tag: ProtocolTag, fabric: Arc<dyn RoutingFabric>) -> Arc<Self> {
        Self::register(MuxCore::new(tag, fabric, DEFAULT_READY_CAPACITY))
    }

    /// Create a multiplexer from configuration.
    pub fn from_config(
        config: &MuxConfig,
        fabric: Arc<dyn RoutingFabric>,
    ) -> Result<Arc<Self>, MuxError> {
        Ok(Self::register(MuxCore::from_config(config, fabric)?))
    }

    fn register(core: MuxCore) -> Arc<Self> {
        let mux = Arc::new(Self { core });
        let fabric = mux.core.fabric().clone();

        let weak = Arc::downgrade(&mux);
        let listener: Weak<dyn ConnectionListener> = weak.clone();
        fabric.subscribe(listener);
        let handler: Weak<dyn DataHandler> = weak;
        fabric.register_protocol(mux.core.tag().clone(), handler);

        debug!(tag = %mux.core.tag(), "Connection multiplexer registered");
        mux
    }
}

impl Multiplexer for ConnectionMux {
    fn core(&self) -> &MuxCore {
        &self.core
    }

    fn sender_to_address(&self, sender: &Sender) -> Option<OverlayAddr> {
        self.core.connection_address(sender)
    }

    fn try_get_sender(&self, addr: &OverlayAddr) -> Option<Sender> {
        self.core.synthesize_connection_sender(addr)
    }
}

impl ConnectionListener for ConnectionMux {
    fn on_connection_event(&self, event: &ConnectionEvent) {
        self.handle_connection_event(event);
    }
}

impl DataHandler for ConnectionMux {
    fn handle_data(&self, frame: &[u8], return_path: Sender) {
        self.handle_inbound(frame, return_path);
    }
}
