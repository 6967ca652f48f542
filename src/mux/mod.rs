//! Connection Multiplexing
//!
//! A multiplexer keeps a symmetric address↔sender map for one protocol
//! tag. Outbound sends resolve a destination address to the current best
//! sender, synthesizing one from the connection table when nothing is
//! cached. Inbound frames are demultiplexed by sender identity back into
//! an address before reaching the subscribed protocol handler.
//!
//! Two variants share the same core:
//!
//! - [`ConnectionMux`] hands out plain connection wrappers.
//! - [`SecureConnectionMux`] only ever hands out and accepts security
//!   sessions, attaching sessions to connections as they appear.
//!
//! ## Locking
//!
//! Both maps and the registered-session set live behind one mutex. The
//! lock is never held while calling into the fabric, the security layer,
//! or a subscriber; `ConnectionReady` events are emitted after release.

mod ondemand;
mod plain;
mod secure;
mod stats;

#[cfg(test)]
mod tests;

pub use ondemand::{DEFAULT_REQUEST_BACKOFF, OnDemandController};
pub use plain::ConnectionMux;
pub use secure::SecureConnectionMux;
pub use stats::{AddressTraffic, MuxStats};

use crate::config::MuxConfig;
use crate::connection::{Connection, ConnectionEvent, RoutingFabric};
use crate::security::SessionId;
use crate::sender::{ConnectionSender, Sender, SenderId};
use crate::transport::Edge;
use crate::wire::{ProtocolTag, TagError};
use crate::OverlayAddr;
use parking_lot::{Mutex, RwLock};
use stats::MuxStatsCounters;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Default capacity of the `ConnectionReady` broadcast channel.
pub const DEFAULT_READY_CAPACITY: usize = 256;

/// Errors from constructing a multiplexer.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("invalid protocol tag: {0}")]
    InvalidTag(#[from] TagError),
}

/// Error type returned by protocol handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives demultiplexed inbound payloads.
///
/// An `Err` is logged with the payload and otherwise swallowed; it never
/// reaches the fabric that delivered the frame.
pub trait ProtocolHandler: Send + Sync {
    fn handle(&self, payload: &[u8], return_path: &Sender) -> Result<(), HandlerError>;
}

/// Reachability of an address through this multiplexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Offline,
    Online,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Offline => "offline",
            ConnectionState::Online => "online",
        };
        write!(f, "{}", s)
    }
}

/// Emitted whenever an address gains or loses its sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionReady {
    pub addr: OverlayAddr,
    pub state: ConnectionState,
}

#[derive(Default)]
struct MuxMaps {
    by_addr: HashMap<OverlayAddr, Sender>,
    by_sender: HashMap<SenderId, OverlayAddr>,
    /// Sessions this multiplexer has subscribed to.
    registered: HashSet<SessionId>,
}

impl MuxMaps {
    /// Remove the pair keyed by `addr`, keeping both maps consistent.
    fn unlink_addr(&mut self, addr: &OverlayAddr) -> Option<Sender> {
        let sender = self.by_addr.remove(addr)?;
        self.by_sender.remove(&sender.id());
        Some(sender)
    }
}

/// Shared state of a multiplexer: maps, on-demand controller, events.
pub struct MuxCore {
    tag: ProtocolTag,
    fabric: Arc<dyn RoutingFabric>,
    ondemand: OnDemandController,
    maps: Mutex<MuxMaps>,
    handler: RwLock<Option<Arc<dyn ProtocolHandler>>>,
    ready_tx: broadcast::Sender<ConnectionReady>,
    stats: MuxStatsCounters,
    traffic: Mutex<HashMap<OverlayAddr, AddressTraffic>>,
}

impl MuxCore {
    /// Create a core for `tag` over `fabric`.
    pub fn new(tag: ProtocolTag, fabric: Arc<dyn RoutingFabric>, ready_capacity: usize) -> Self {
        let (ready_tx, _) = broadcast::channel(ready_capacity.max(1));
        Self {
            tag,
            ondemand: OnDemandController::new(fabric.clone()),
            fabric,
            maps: Mutex::new(MuxMaps::default()),
            handler: RwLock::new(None),
            ready_tx,
            stats: MuxStatsCounters::default(),
            traffic: Mutex::new(HashMap::new()),
        }
    }

    /// Create a core from configuration.
    pub fn from_config(config: &MuxConfig, fabric: Arc<dyn RoutingFabric>) -> Result<Self, MuxError> {
        let tag = ProtocolTag::new(config.protocol_tag())?;
        let mut core = Self::new(tag, fabric.clone(), config.ready_channel_capacity());
        core.ondemand = OnDemandController::with_backoff(fabric, config.request_backoff());
        Ok(core)
    }

    /// The protocol tag this core frames with.
    pub fn tag(&self) -> &ProtocolTag {
        &self.tag
    }

    pub fn fabric(&self) -> &Arc<dyn RoutingFabric> {
        &self.fabric
    }

    pub fn ondemand(&self) -> &OnDemandController {
        &self.ondemand
    }

    // === Map Operations ===

    /// Install `sender` as the sender for `addr`.
    ///
    /// Evicts the address's previous sender from the reverse map, and the
    /// sender's previous address if it was mapped elsewhere. Emits `Online`
    /// only when the mapping changed. Returns whether it changed.
    pub fn install(&self, addr: OverlayAddr, sender: Sender) -> bool {
        self.install_guarded(addr, sender, |_| true) == Some(true)
    }

    /// Install a session sender only while the session is still registered.
    ///
    /// The registration check and the map mutation share one critical
    /// section, so a session retired by its `Closed` transition can never be
    /// mapped afterwards. Returns whether the session is mapped for `addr`
    /// once the call returns; non-session senders are refused.
    pub fn install_session(&self, addr: OverlayAddr, sender: Sender) -> bool {
        let Some(id) = sender.as_session().map(|session| session.id()) else {
            return false;
        };
        match self.install_guarded(addr, sender, |maps| maps.registered.contains(&id)) {
            Some(_) => true,
            None => {
                trace!(addr = %addr, session = %id, "Refused to install retired session");
                false
            }
        }
    }

    fn install_guarded(
        &self,
        addr: OverlayAddr,
        sender: Sender,
        allowed: impl FnOnce(&MuxMaps) -> bool,
    ) -> Option<bool> {
        let id = sender.id();
        let evicted_addr = {
            let mut maps = self.maps.lock();
            if !allowed(&maps) {
                return None;
            }
            if maps.by_addr.get(&addr).map(Sender::id) == Some(id) {
                return Some(false);
            }

            let evicted_addr = maps.by_sender.get(&id).copied().filter(|prev| *prev != addr);
            if let Some(prev) = &evicted_addr {
                maps.unlink_addr(prev);
            }
            if let Some(old) = maps.by_addr.insert(addr, sender) {
                maps.by_sender.remove(&old.id());
            }
            maps.by_sender.insert(id, addr);
            evicted_addr
        };

        debug!(addr = %addr, sender = %id, tag = %self.tag, "Installed sender");
        if let Some(prev) = evicted_addr {
            self.emit(prev, ConnectionState::Offline);
        }
        self.emit(addr, ConnectionState::Online);
        Some(true)
    }

    /// Remove whatever sender is mapped for `addr`. Emits `Offline` if one was.
    pub fn remove(&self, addr: &OverlayAddr) -> Option<Sender> {
        let removed = self.maps.lock().unlink_addr(addr);
        if let Some(sender) = &removed {
            debug!(addr = %addr, sender = %sender.id(), tag = %self.tag, "Removed sender");
            self.emit(*addr, ConnectionState::Offline);
        }
        removed
    }

    /// Remove the mapping for `addr` only if it is still `id`.
    pub fn remove_if(&self, addr: &OverlayAddr, id: SenderId) -> bool {
        let removed = {
            let mut maps = self.maps.lock();
            let current = maps.by_addr.get(addr).map(Sender::id);
            current == Some(id) && maps.unlink_addr(addr).is_some()
        };
        if removed {
            debug!(addr = %addr, sender = %id, tag = %self.tag, "Removed sender");
            self.emit(*addr, ConnectionState::Offline);
        }
        removed
    }

    /// Sender currently mapped for `addr`.
    pub fn sender_for(&self, addr: &OverlayAddr) -> Option<Sender> {
        self.maps.lock().by_addr.get(addr).cloned()
    }

    /// Address currently mapped for the sender identity `id`.
    pub fn address_for(&self, id: &SenderId) -> Option<OverlayAddr> {
        self.maps.lock().by_sender.get(id).copied()
    }

    /// Check if `addr` has a mapped sender.
    pub fn is_mapped(&self, addr: &OverlayAddr) -> bool {
        self.maps.lock().by_addr.contains_key(addr)
    }

    /// Snapshot of all address↔sender pairs.
    pub fn mappings(&self) -> Vec<(OverlayAddr, SenderId)> {
        self.maps
            .lock()
            .by_addr
            .iter()
            .map(|(addr, sender)| (*addr, sender.id()))
            .collect()
    }

    /// Number of mapped addresses.
    pub fn mapped_count(&self) -> usize {
        self.maps.lock().by_addr.len()
    }

    // === Session Registration ===

    /// Record that a session has been subscribed to.
    ///
    /// Returns true the first time for a given session, false afterwards.
    pub fn register_session(&self, id: SessionId) -> bool {
        self.maps.lock().registered.insert(id)
    }

    /// Check if a session is registered.
    pub fn is_session_registered(&self, id: &SessionId) -> bool {
        self.maps.lock().registered.contains(id)
    }

    /// Number of registered sessions.
    pub fn registered_sessions(&self) -> usize {
        self.maps.lock().registered.len()
    }

    /// Forget a closed session: unmap it if it is still the sender for
    /// `addr` and drop its registration, in one critical section.
    pub fn retire_session(&self, addr: Option<&OverlayAddr>, id: SessionId) -> bool {
        let sender_id = SenderId::Session(id);
        let removed = {
            let mut maps = self.maps.lock();
            maps.registered.remove(&id);
            match addr {
                Some(addr) if maps.by_addr.get(addr).map(Sender::id) == Some(sender_id) => {
                    maps.unlink_addr(addr).is_some()
                }
                _ => false,
            }
        };
        if let (true, Some(addr)) = (removed, addr) {
            debug!(addr = %addr, session = %id, tag = %self.tag, "Removed closed session");
            self.emit(*addr, ConnectionState::Offline);
        }
        removed
    }

    // === Connection-Table Helpers ===

    /// Address a plain sender represents, via the connection table.
    ///
    /// Connection wrappers carry their address; edges are looked up by the
    /// connection they currently carry; routed senders name their peer.
    pub fn connection_address(&self, sender: &Sender) -> Option<OverlayAddr> {
        match sender {
            Sender::Connection(cs) => Some(*cs.connection().addr()),
            Sender::Edge(edge) => self
                .fabric
                .connection_for_edge(edge.id())
                .map(|con| *con.addr()),
            Sender::Routed(routed) => Some(*routed.dest()),
            Sender::Session(_) => None,
        }
    }

    /// Structured connection to `addr` from the connection table.
    pub fn structured_connection(&self, addr: &OverlayAddr) -> Option<Arc<Connection>> {
        self.fabric
            .connection_to(addr)
            .filter(|con| con.is_structured())
    }

    /// Wrap and memoize a connection sender for `addr`.
    pub fn synthesize_connection_sender(&self, addr: &OverlayAddr) -> Option<Sender> {
        let con = self.structured_connection(addr)?;
        let sender = Sender::from(ConnectionSender::new(con.clone()));
        self.install(*con.addr(), sender.clone());
        Some(sender)
    }

    // === Events, Handler, Stats ===

    fn emit(&self, addr: OverlayAddr, state: ConnectionState) {
        // No receivers is not an error.
        let _ = self.ready_tx.send(ConnectionReady { addr, state });
    }

    pub fn subscribe_ready(&self) -> broadcast::Receiver<ConnectionReady> {
        self.ready_tx.subscribe()
    }

    pub fn set_handler(&self, handler: Arc<dyn ProtocolHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Hand a payload to the subscribed handler, containing any fault.
    pub fn dispatch(&self, payload: &[u8], return_path: &Sender) {
        let handler = self.handler.read().clone();
        let Some(handler) = handler else {
            trace!(tag = %self.tag, from = %return_path, "No handler subscribed, dropping payload");
            return;
        };
        if let Err(e) = handler.handle(payload, return_path) {
            self.stats.record_dispatch_failure();
            warn!(
                tag = %self.tag,
                from = %return_path,
                len = payload.len(),
                payload = %String::from_utf8_lossy(payload),
                error = %e,
                "Error handling packet"
            );
        }
    }

    pub fn stats(&self) -> MuxStats {
        self.stats.snapshot()
    }

    pub(crate) fn counters(&self) -> &MuxStatsCounters {
        &self.stats
    }

    /// Per-address traffic counters.
    pub fn traffic(&self, addr: &OverlayAddr) -> AddressTraffic {
        self.traffic.lock().get(addr).copied().unwrap_or_default()
    }

    fn record_tx(&self, addr: &OverlayAddr, len: usize) {
        self.traffic.lock().entry(*addr).or_default().record_tx(len);
    }

    fn record_rx(&self, addr: &OverlayAddr, len: usize) {
        self.traffic.lock().entry(*addr).or_default().record_rx(len);
    }
}

/// The address-keyed send/receive contract shared by both multiplexers.
///
/// The provided methods implement the contract on top of [`MuxCore`];
/// implementors customize it through `sender_to_address`,
/// `try_get_sender`, `accept_inbound`, and the connection hooks.
pub trait Multiplexer: Send + Sync {
    fn core(&self) -> &MuxCore;

    /// Resolve a sender not yet in the maps to the address it represents.
    fn sender_to_address(&self, sender: &Sender) -> Option<OverlayAddr>;

    /// Find or create a sender for `addr` when none is cached, memoizing it.
    fn try_get_sender(&self, addr: &OverlayAddr) -> Option<Sender>;

    /// Gate on inbound return paths.
    fn accept_inbound(&self, _return_path: &Sender) -> bool {
        true
    }

    /// A desired structured connection appeared.
    fn valid_connection(&self, con: &Arc<Connection>) {
        self.core()
            .install(*con.addr(), Sender::from(ConnectionSender::new(con.clone())));
    }

    /// A structured connection went away.
    fn valid_disconnection(&self, con: &Arc<Connection>) {
        self.core().remove(con.addr());
    }

    /// A structured connection's edge was replaced.
    fn edge_replaced(&self, _con: &Arc<Connection>, _previous: &Arc<dyn Edge>) {}

    // === Provided ===

    /// Mark `addr` desired so the fabric opens a direct connection.
    fn connect_to(&self, addr: &OverlayAddr) {
        self.core().ondemand().set(addr);
    }

    /// True if a sender is known or can be synthesized now.
    fn contains_address(&self, addr: &OverlayAddr) -> bool {
        self.core().is_mapped(addr) || self.try_get_sender(addr).is_some()
    }

    /// Resolve a sender to its address, memoizing a fresh resolution.
    fn get_address(&self, sender: &Sender) -> Option<OverlayAddr> {
        let core = self.core();
        if let Some(addr) = core.address_for(&sender.id()) {
            return Some(addr);
        }
        let addr = self.sender_to_address(sender)?;
        core.install(addr, sender.clone());
        Some(addr)
    }

    /// Sender currently mapped for `addr`.
    fn get_sender(&self, addr: &OverlayAddr) -> Option<Sender> {
        self.core().sender_for(addr)
    }

    /// Frame `payload` with the protocol tag and push it toward `addr`.
    ///
    /// Returns false when no sender is available or the send faulted; the
    /// caller retries at the application level.
    fn send(&self, addr: &OverlayAddr, payload: &[u8]) -> bool {
        let core = self.core();
        core.ondemand().set(addr);

        let sender = match core.sender_for(addr) {
            Some(sender) => Some(sender),
            None => self.try_get_sender(addr),
        };
        let Some(sender) = sender else {
            core.counters().record_unreachable();
            debug!(addr = %addr, tag = %core.tag(), "Unable to find a destination for address");
            return false;
        };

        match sender.send(&core.tag().frame(payload)) {
            Ok(()) => {
                core.counters().record_sent();
                core.record_tx(addr, payload.len());
                true
            }
            Err(e) => {
                core.counters().record_send_failure();
                debug!(addr = %addr, sender = %sender, error = %e, "Send failed");
                false
            }
        }
    }

    /// Inbound path: strip the tag, resolve the return path, dispatch.
    fn handle_inbound(&self, frame: &[u8], return_path: Sender) {
        let core = self.core();
        let Some(payload) = core.tag().strip(frame) else {
            trace!(tag = %core.tag(), from = %return_path, "Frame does not carry our tag");
            return;
        };

        if !self.accept_inbound(&return_path) {
            core.counters().record_rejected_insecure();
            warn!(tag = %core.tag(), from = %return_path, "Insecure sender rejected");
            return;
        }

        let Some(addr) = self.get_address(&return_path) else {
            core.counters().record_unresolved_inbound();
            debug!(tag = %core.tag(), from = %return_path, "Unable to obtain an address for sender");
            return;
        };

        core.ondemand().set(&addr);
        core.counters().record_received();
        core.record_rx(&addr, payload.len());
        core.dispatch(payload, &return_path);
    }

    /// React to a connection-table transition. Non-structured connections
    /// are ignored.
    fn handle_connection_event(&self, event: &ConnectionEvent) {
        if !event.connection().is_structured() {
            return;
        }
        match event {
            ConnectionEvent::Connected(con) => {
                if self.core().ondemand().is_desired(con.addr()) {
                    self.valid_connection(con);
                }
            }
            ConnectionEvent::Disconnected(con) => self.valid_disconnection(con),
            ConnectionEvent::EdgeReplaced {
                connection,
                previous,
            } => self.edge_replaced(connection, previous),
        }
    }

    /// Register the single protocol handler, replacing any previous one.
    fn subscribe(&self, handler: Arc<dyn ProtocolHandler>) {
        self.core().set_handler(handler);
    }

    fn subscribe_ready(&self) -> broadcast::Receiver<ConnectionReady> {
        self.core().subscribe_ready()
    }

    fn stats(&self) -> MuxStats {
        self.core().stats()
    }
}
