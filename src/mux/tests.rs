use super::*;
use crate::connection::ConnectionType;
use crate::memory::{MemoryEdge, MemoryFabric, MemoryNetwork, MemorySecurity};
use crate::security::{SecurityLayer, SecuritySession, SessionListener, SessionState};
use crate::transport::{EdgeId, TransportError};
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::Receiver;

fn make_addr(val: u8) -> OverlayAddr {
    let mut bytes = [0u8; 16];
    bytes[0] = val;
    OverlayAddr::from_bytes(bytes)
}

fn tag() -> ProtocolTag {
    ProtocolTag::new("ipop").unwrap()
}

fn edge_sender(id: u64) -> (Arc<MemoryEdge>, Sender) {
    let edge = MemoryEdge::detached(id);
    let dyn_edge: Arc<dyn Edge> = edge.clone();
    (edge, Sender::from(dyn_edge))
}

fn online(addr: OverlayAddr) -> ConnectionReady {
    ConnectionReady {
        addr,
        state: ConnectionState::Online,
    }
}

fn offline(addr: OverlayAddr) -> ConnectionReady {
    ConnectionReady {
        addr,
        state: ConnectionState::Offline,
    }
}

fn drain(rx: &mut Receiver<ConnectionReady>) -> Vec<ConnectionReady> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[derive(Default)]
struct Collector {
    received: Mutex<Vec<(Vec<u8>, SenderId)>>,
    fail: bool,
}

impl Collector {
    fn failing() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn payloads(&self) -> Vec<Vec<u8>> {
        self.received.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    fn last_sender(&self) -> Option<SenderId> {
        self.received.lock().last().map(|(_, id)| *id)
    }
}

impl ProtocolHandler for Collector {
    fn handle(&self, payload: &[u8], return_path: &Sender) -> Result<(), HandlerError> {
        self.received
            .lock()
            .push((payload.to_vec(), return_path.id()));
        if self.fail {
            return Err("handler exploded".into());
        }
        Ok(())
    }
}

fn assert_symmetric(core: &MuxCore) {
    for (addr, id) in core.mappings() {
        assert_eq!(core.address_for(&id), Some(addr));
    }
}

// === Map Maintenance ===

#[test]
fn test_install_keeps_maps_symmetric() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mux = ConnectionMux::new(tag(), fabric);
    let core = mux.core();
    let mut rx = mux.subscribe_ready();

    let a = make_addr(1);
    let b = make_addr(2);
    let (_e1, s1) = edge_sender(1);
    let (_e2, s2) = edge_sender(2);

    assert!(core.install(a, s1.clone()));
    assert!(!core.install(a, s1.clone()));
    assert_symmetric(core);

    // Replacing the sender for an address drops the old reverse entry
    assert!(core.install(a, s2.clone()));
    assert_eq!(core.address_for(&s1.id()), None);
    assert_eq!(core.address_for(&s2.id()), Some(a));
    assert_symmetric(core);

    // Moving a sender to another address evicts its previous address
    assert!(core.install(b, s2.clone()));
    assert!(!core.is_mapped(&a));
    assert_eq!(core.mapped_count(), 1);
    assert_symmetric(core);

    assert_eq!(
        drain(&mut rx),
        vec![online(a), online(a), offline(a), online(b)]
    );
}

#[test]
fn test_remove_if_only_removes_matching_sender() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mux = ConnectionMux::new(tag(), fabric);
    let core = mux.core();
    let a = make_addr(1);
    let (_e1, s1) = edge_sender(1);
    let (_e2, s2) = edge_sender(2);

    core.install(a, s2.clone());
    let mut rx = mux.subscribe_ready();

    assert!(!core.remove_if(&a, s1.id()));
    assert!(core.is_mapped(&a));
    assert!(core.remove_if(&a, s2.id()));
    assert!(core.remove(&a).is_none());
    assert_eq!(core.address_for(&s2.id()), None);
    assert_eq!(drain(&mut rx), vec![offline(a)]);
}

// === Plain Multiplexer ===

#[test]
fn test_send_before_and_after_connection() {
    let local = make_addr(0);
    let b = make_addr(2);
    let fabric = MemoryFabric::new(local);
    let mux = ConnectionMux::new(tag(), fabric.clone());
    let mut rx = mux.subscribe_ready();

    assert!(!mux.send(&b, b"early"));
    assert!(mux.core().ondemand().is_desired(&b));
    assert_eq!(fabric.requested(), vec![b]);
    assert_eq!(mux.stats().unreachable, 1);

    let edge = MemoryEdge::detached(7);
    fabric.attach_with(b, ConnectionType::Structured, edge.clone());
    assert_eq!(drain(&mut rx), vec![online(b)]);

    assert!(mux.send(&b, b"hello"));
    assert_eq!(edge.sent(), vec![tag().frame(b"hello")]);
    assert_eq!(mux.core().traffic(&b).tx_frames, 1);

    fabric.detach(&b);
    assert!(!mux.contains_address(&b));
    assert!(mux.get_sender(&b).is_none());
    assert_eq!(drain(&mut rx), vec![offline(b)]);
}

#[test]
fn test_undesired_connection_is_not_installed() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mux = ConnectionMux::new(tag(), fabric.clone());
    let b = make_addr(2);

    fabric.attach(b);
    assert!(!mux.core().is_mapped(&b));
    // Still reachable: the connection table yields a sender on demand
    assert!(mux.contains_address(&b));
    assert!(mux.core().is_mapped(&b));
}

#[test]
fn test_non_structured_connection_ignored() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mux = ConnectionMux::new(tag(), fabric.clone());
    let b = make_addr(2);
    mux.connect_to(&b);

    fabric.attach_with(b, ConnectionType::Leaf, MemoryEdge::detached(3));
    assert!(!mux.core().is_mapped(&b));
    assert!(!mux.contains_address(&b));
}

#[test]
fn test_plain_edge_replacement_follows_connection() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mux = ConnectionMux::new(tag(), fabric.clone());
    let b = make_addr(2);
    mux.connect_to(&b);

    let first = MemoryEdge::detached(10);
    let second = MemoryEdge::detached(11);
    fabric.attach_with(b, ConnectionType::Structured, first.clone());
    fabric.swap_edge(&b, second.clone());

    assert!(mux.send(&b, b"after swap"));
    assert!(first.sent().is_empty());
    assert_eq!(second.sent(), vec![tag().frame(b"after swap")]);
}

#[test]
fn test_inbound_edge_resolves_through_connection_table() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mux = ConnectionMux::new(tag(), fabric.clone());
    let collector = Arc::new(Collector::default());
    mux.subscribe(collector.clone());

    let b = make_addr(2);
    let edge = MemoryEdge::detached(20);
    fabric.attach_with(b, ConnectionType::Structured, edge);

    assert_eq!(fabric.deliver(&tag().frame(b"ping"), EdgeId::new(20)), 1);
    assert_eq!(collector.payloads(), vec![b"ping".to_vec()]);
    assert_eq!(collector.last_sender(), Some(SenderId::Edge(EdgeId::new(20))));
    assert_eq!(
        mux.core().address_for(&SenderId::Edge(EdgeId::new(20))),
        Some(b)
    );
    // Inbound data marks the peer desired
    assert!(mux.core().ondemand().is_desired(&b));
    assert_eq!(mux.core().traffic(&b).rx_bytes, 4);
}

#[test]
fn test_inbound_from_unknown_edge_dropped() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mux = ConnectionMux::new(tag(), fabric.clone());
    let collector = Arc::new(Collector::default());
    mux.subscribe(collector.clone());

    let (_edge, sender) = edge_sender(30);
    mux.handle_inbound(&tag().frame(b"who"), sender);

    assert!(collector.payloads().is_empty());
    assert_eq!(mux.stats().unresolved_inbound, 1);
    assert_eq!(mux.core().mapped_count(), 0);
}

#[test]
fn test_foreign_tag_not_dispatched() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mux = ConnectionMux::new(tag(), fabric.clone());
    let collector = Arc::new(Collector::default());
    mux.subscribe(collector.clone());

    let other = ProtocolTag::new("other").unwrap();
    let (_edge, sender) = edge_sender(31);
    mux.handle_inbound(&other.frame(b"x"), sender);
    assert!(collector.payloads().is_empty());
    assert_eq!(mux.stats(), MuxStats::default());
}

#[test]
fn test_handler_error_contained() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mux = ConnectionMux::new(tag(), fabric.clone());
    let collector = Arc::new(Collector::failing());
    mux.subscribe(collector.clone());

    let b = make_addr(2);
    fabric.attach_with(b, ConnectionType::Structured, MemoryEdge::detached(40));
    fabric.deliver(&tag().frame(b"bad"), EdgeId::new(40));
    fabric.deliver(&tag().frame(b"worse"), EdgeId::new(40));

    assert_eq!(collector.payloads().len(), 2);
    let stats = mux.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.dispatch_failures, 2);
}

#[test]
fn test_from_config_rejects_bad_tag() {
    let fabric = MemoryFabric::new(make_addr(0));
    let mut config = MuxConfig::default();
    config.protocol_tag = Some(String::new());
    assert!(matches!(
        ConnectionMux::from_config(&config, fabric),
        Err(MuxError::InvalidTag(TagError::Empty))
    ));
}

// === Secure Multiplexer ===

fn secure_setup() -> (
    Arc<MemoryFabric>,
    Arc<MemorySecurity>,
    Arc<SecureConnectionMux>,
) {
    let fabric = MemoryFabric::new(make_addr(0));
    let security = MemorySecurity::new();
    fabric.set_security(security.clone());
    let mux = SecureConnectionMux::new(tag(), fabric.clone(), security.clone());
    (fabric, security, mux)
}

#[test]
fn test_secure_rejects_plain_sender() {
    let (fabric, _security, mux) = secure_setup();
    let collector = Arc::new(Collector::default());
    mux.subscribe(collector.clone());

    let b = make_addr(2);
    let edge = MemoryEdge::detached(50);
    fabric.attach_with(b, ConnectionType::Structured, edge.clone());

    // No session on the edge, so the frame arrives on the bare edge
    fabric.deliver(&tag().frame(b"sneaky"), EdgeId::new(50));
    let dyn_edge: Arc<dyn Edge> = edge;
    mux.handle_inbound(&tag().frame(b"sneaky"), Sender::from(dyn_edge));

    assert!(collector.payloads().is_empty());
    assert_eq!(mux.core().mapped_count(), 0);
    assert_eq!(mux.stats().rejected_insecure, 2);
}

#[test]
fn test_secure_installs_session_once_active() {
    let (fabric, security, mux) = secure_setup();
    let mut rx = mux.subscribe_ready();
    let b = make_addr(2);
    mux.connect_to(&b);

    let edge = MemoryEdge::detached(60);
    fabric.attach_with(b, ConnectionType::Structured, edge.clone());
    assert!(!mux.core().is_mapped(&b));
    assert_eq!(mux.core().registered_sessions(), 1);

    // Waiting sessions are never handed out
    assert!(!mux.send(&b, b"too soon"));
    assert_eq!(security.created(), 1);
    assert_eq!(security.session(EdgeId::new(60)).unwrap().listener_count(), 1);

    assert!(security.activate(EdgeId::new(60)));
    assert_eq!(drain(&mut rx), vec![online(b)]);
    assert!(mux.get_sender(&b).unwrap().is_session());

    assert!(mux.send(&b, b"now"));
    assert_eq!(edge.sent(), vec![tag().frame(b"now")]);

    // Re-keying keeps the mapping
    assert!(security.begin_update(EdgeId::new(60)));
    assert!(mux.send(&b, b"rekey"));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_secure_session_close_cleans_up_once() {
    let (fabric, security, mux) = secure_setup();
    let b = make_addr(2);
    mux.connect_to(&b);
    fabric.attach_with(b, ConnectionType::Structured, MemoryEdge::detached(70));
    security.activate(EdgeId::new(70));
    let session = security.session(EdgeId::new(70)).unwrap();
    let mut rx = mux.subscribe_ready();

    fabric.detach(&b);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(
        session.close_reason().as_deref(),
        Some(super::secure::CONNECTION_CLOSED_REASON)
    );
    assert!(!mux.core().is_mapped(&b));
    assert_eq!(mux.core().registered_sessions(), 0);

    session.close("again");
    assert_eq!(drain(&mut rx), vec![offline(b)]);
}

#[test]
fn test_secure_disconnect_closes_pending_session() {
    let (fabric, security, mux) = secure_setup();
    let b = make_addr(2);
    mux.connect_to(&b);
    fabric.attach_with(b, ConnectionType::Structured, MemoryEdge::detached(71));
    let session = security.session(EdgeId::new(71)).unwrap();
    assert_eq!(session.state(), SessionState::Waiting);

    fabric.detach(&b);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(mux.core().registered_sessions(), 0);
}

#[test]
fn test_secure_edge_replacement_reattaches() {
    let (fabric, security, mux) = secure_setup();
    let b = make_addr(2);
    mux.connect_to(&b);
    fabric.attach_with(b, ConnectionType::Structured, MemoryEdge::detached(80));
    security.activate(EdgeId::new(80));
    let old = mux.get_sender(&b).unwrap().id();

    let replacement = MemoryEdge::detached(81);
    fabric.swap_edge(&b, replacement.clone());
    assert_eq!(security.created(), 2);
    // The old session keeps serving until the new one is ready
    assert_eq!(mux.get_sender(&b).unwrap().id(), old);

    security.activate(EdgeId::new(81));
    let new = mux.get_sender(&b).unwrap().id();
    assert_ne!(new, old);
    assert_eq!(mux.core().address_for(&old), None);

    // Closing the superseded session leaves the new mapping alone
    assert!(security.close(EdgeId::new(80), "superseded"));
    assert_eq!(mux.get_sender(&b).unwrap().id(), new);
    assert_symmetric(mux.core());

    assert!(mux.send(&b, b"via new edge"));
    assert_eq!(replacement.sent(), vec![tag().frame(b"via new edge")]);
}

#[test]
fn test_secure_edge_replacement_ignored_when_undesired() {
    let (fabric, security, mux) = secure_setup();
    let b = make_addr(2);
    fabric.attach_with(b, ConnectionType::Structured, MemoryEdge::detached(90));
    fabric.swap_edge(&b, MemoryEdge::detached(91));
    assert_eq!(security.created(), 0);
    assert_eq!(mux.core().mapped_count(), 0);
}

/// Session that reports `Closed` to its listeners from inside a query,
/// then answers as if it were still active.
struct ClosingSession {
    id: SessionId,
    edge: Arc<dyn Edge>,
    close_in_underlying: bool,
    closed: AtomicBool,
    listeners: Mutex<Vec<Weak<dyn SessionListener>>>,
    this: Weak<ClosingSession>,
}

impl ClosingSession {
    fn new(id: u64, edge: Arc<dyn Edge>, close_in_underlying: bool) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: SessionId::new(id),
            edge,
            close_in_underlying,
            closed: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            this: this.clone(),
        })
    }

    fn close_now(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let session: Arc<dyn SecuritySession> = this;
        let listeners: Vec<_> = self.listeners.lock().iter().filter_map(Weak::upgrade).collect();
        for listener in listeners {
            listener.on_session_state(&session, SessionState::Closed);
        }
    }
}

impl fmt::Debug for ClosingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosingSession").field("id", &self.id).finish()
    }
}

impl SecuritySession for ClosingSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn state(&self) -> SessionState {
        if self.closed.load(Ordering::SeqCst) {
            return SessionState::Closed;
        }
        if !self.close_in_underlying {
            self.close_now();
        }
        SessionState::Active
    }

    fn underlying(&self) -> Sender {
        if self.close_in_underlying {
            self.close_now();
        }
        Sender::Edge(self.edge.clone())
    }

    fn send(&self, _frame: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::SessionClosed)
    }

    fn close(&self, _reason: &str) {
        self.close_now();
    }

    fn subscribe(&self, listener: Weak<dyn SessionListener>) {
        self.listeners.lock().push(listener);
    }
}

struct FixedSecurity {
    session: Arc<ClosingSession>,
}

impl SecurityLayer for FixedSecurity {
    fn create_session(&self, _edge: &Arc<dyn Edge>) -> Arc<dyn SecuritySession> {
        self.session.clone()
    }

    fn existing_session(&self, _edge: EdgeId) -> Option<Arc<dyn SecuritySession>> {
        Some(self.session.clone())
    }
}

fn closing_setup(
    close_in_underlying: bool,
) -> (Arc<MemoryFabric>, Arc<ClosingSession>, Arc<SecureConnectionMux>) {
    let b = make_addr(2);
    let fabric = MemoryFabric::new(make_addr(0));
    let con = fabric.attach(b);
    let session = ClosingSession::new(999, con.edge(), close_in_underlying);
    let security = Arc::new(FixedSecurity {
        session: session.clone(),
    });
    let mux = SecureConnectionMux::new(tag(), fabric.clone(), security);
    (fabric, session, mux)
}

#[test]
fn test_secure_session_closed_during_readiness_check_not_installed() {
    let (_fabric, session, mux) = closing_setup(false);
    let b = make_addr(2);
    let mut rx = mux.subscribe_ready();

    assert!(mux.try_get_sender(&b).is_none());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!mux.core().is_mapped(&b));
    assert_eq!(mux.core().address_for(&SenderId::Session(session.id())), None);
    assert_eq!(mux.core().registered_sessions(), 0);
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_secure_inbound_session_closed_during_resolution_not_installed() {
    let (_fabric, session, mux) = closing_setup(true);
    let b = make_addr(2);
    let collector = Arc::new(Collector::default());
    mux.subscribe(collector.clone());

    let dyn_session: Arc<dyn SecuritySession> = session.clone();
    mux.handle_inbound(&tag().frame(b"last words"), Sender::Session(dyn_session));

    assert_eq!(collector.payloads(), vec![b"last words".to_vec()]);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!mux.core().is_mapped(&b));
    assert_eq!(mux.core().registered_sessions(), 0);
}

#[test]
fn test_install_session_requires_registration() {
    let (_fabric, _security, mux) = secure_setup();
    let core = mux.core();
    let a = make_addr(1);
    let (_edge, plain) = edge_sender(7);
    let dyn_edge: Arc<dyn Edge> = MemoryEdge::detached(8);
    let session: Arc<dyn SecuritySession> = ClosingSession::new(77, dyn_edge, true);
    let sender = Sender::Session(session.clone());

    assert!(!core.install_session(a, plain));
    assert!(!core.install_session(a, sender.clone()));
    assert!(!core.is_mapped(&a));

    assert!(core.register_session(session.id()));
    assert!(core.install_session(a, sender.clone()));
    assert!(core.install_session(a, sender));
    assert_eq!(core.address_for(&SenderId::Session(session.id())), Some(a));
}

// === End to End ===

#[test]
fn test_plain_network_round_trip() {
    let a = make_addr(1);
    let b = make_addr(2);
    let network = MemoryNetwork::new();
    let fa = network.add_node(a);
    let fb = network.add_node(b);
    let mux_a = ConnectionMux::new(tag(), fa.clone());
    let mux_b = ConnectionMux::new(tag(), fb.clone());
    let inbox_a = Arc::new(Collector::default());
    let inbox_b = Arc::new(Collector::default());
    mux_a.subscribe(inbox_a.clone());
    mux_b.subscribe(inbox_b.clone());

    // The first send opens the connection on demand
    assert!(mux_a.send(&b, b"hello"));
    assert_eq!(fa.connection_count(), 1);
    assert_eq!(fb.connection_count(), 1);
    assert_eq!(inbox_b.payloads(), vec![b"hello".to_vec()]);
    assert!(mux_b.core().is_mapped(&a));

    assert!(mux_b.send(&a, b"back"));
    assert_eq!(inbox_a.payloads(), vec![b"back".to_vec()]);

    network.disconnect(&a, &b);
    assert!(!mux_a.contains_address(&b));
    assert!(!mux_b.core().is_mapped(&a));
}

#[test]
fn test_routed_inbound_resolves_to_origin() {
    let a = make_addr(1);
    let b = make_addr(2);
    let network = MemoryNetwork::new();
    let fa = network.add_node(a);
    let fb = network.add_node(b);
    let _mux_a = ConnectionMux::new(tag(), fa.clone());
    let mux_b = ConnectionMux::new(tag(), fb.clone());
    let inbox_b = Arc::new(Collector::default());
    mux_b.subscribe(inbox_b.clone());

    let routed = Sender::Routed(fa.routed_sender(&b));
    routed.send(&tag().frame(b"over the ring")).unwrap();

    assert_eq!(fa.routed().len(), 1);
    assert_eq!(inbox_b.payloads(), vec![b"over the ring".to_vec()]);
    assert_eq!(inbox_b.last_sender(), Some(SenderId::Routed(a)));

    // Inbound traffic marks the origin desired, and the direct connection
    // it opens supersedes the routed path
    assert!(mux_b.core().ondemand().is_desired(&a));
    assert_eq!(fb.connection_count(), 1);
    assert_eq!(mux_b.core().address_for(&SenderId::Routed(a)), None);
    assert!(matches!(mux_b.get_sender(&a), Some(Sender::Connection(_))));
    assert_symmetric(mux_b.core());
}

#[test]
fn test_routed_inbound_mapped_without_direct_connection() {
    let a = make_addr(1);
    let fabric = MemoryFabric::new(make_addr(2));
    let mux = ConnectionMux::new(tag(), fabric.clone());
    let inbox = Arc::new(Collector::default());
    mux.subscribe(inbox.clone());

    let routed = Sender::Routed(fabric.routed_sender(&a));
    assert_eq!(fabric.deliver_from(&tag().frame(b"via ring"), routed), 1);

    assert_eq!(inbox.payloads(), vec![b"via ring".to_vec()]);
    assert_eq!(fabric.requested(), vec![a]);
    assert_eq!(mux.core().address_for(&SenderId::Routed(a)), Some(a));
    assert!(matches!(mux.get_sender(&a), Some(Sender::Routed(_))));
}

#[test]
fn test_secure_network_round_trip() {
    let a = make_addr(1);
    let b = make_addr(2);
    let network = MemoryNetwork::new();
    let fa = network.add_node(a);
    let fb = network.add_node(b);
    let sec_a = MemorySecurity::with_auto_activate();
    let sec_b = MemorySecurity::with_auto_activate();
    fa.set_security(sec_a.clone());
    fb.set_security(sec_b.clone());

    let mux_a = SecureConnectionMux::new(tag(), fa.clone(), sec_a.clone());
    let mux_b = SecureConnectionMux::new(tag(), fb.clone(), sec_b.clone());
    let inbox_a = Arc::new(Collector::default());
    let inbox_b = Arc::new(Collector::default());
    mux_a.subscribe(inbox_a.clone());
    mux_b.subscribe(inbox_b.clone());

    assert!(mux_a.send(&b, b"secret"));
    assert_eq!(inbox_b.payloads(), vec![b"secret".to_vec()]);
    assert!(mux_b.get_sender(&a).unwrap().is_session());
    assert_eq!(mux_b.core().registered_sessions(), 1);

    assert!(mux_b.send(&a, b"reply"));
    assert_eq!(inbox_a.payloads(), vec![b"reply".to_vec()]);
    assert!(matches!(inbox_a.last_sender(), Some(SenderId::Session(_))));

    network.disconnect(&a, &b);
    assert!(!mux_a.core().is_mapped(&b));
    assert!(!mux_b.core().is_mapped(&a));
    assert_eq!(mux_a.core().registered_sessions(), 0);
    assert_eq!(mux_b.core().registered_sessions(), 0);
}
