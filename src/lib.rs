//! Overmux: transport resolution and secure-channel multiplexing for
//! structured overlay networks.
//!
//! Applications address peers by overlay address. A multiplexer turns an
//! address into the best available sender (a direct connection, a security
//! session, or a routed path), demultiplexes inbound frames back into
//! addresses, and asks the routing fabric for direct connections on demand.
//! Resolvers map external keys such as IP addresses onto overlay addresses
//! through a DHT.

pub mod address;
pub mod cache;
pub mod config;
pub mod connection;
pub mod memory;
pub mod mux;
pub mod resolver;
pub mod security;
pub mod sender;
pub mod transport;
pub mod wire;

// Re-export address types
pub use address::{AddressError, OverlayAddr};

// Re-export config types
pub use config::{Config, ConfigError, MuxConfig, OnDemandConfig, ResolverConfig};

// Re-export connection types
pub use connection::{
    Connection, ConnectionEvent, ConnectionId, ConnectionListener, ConnectionType, DataHandler,
    RoutingFabric,
};

// Re-export transport and security types
pub use security::{SecurityLayer, SecuritySession, SessionId, SessionListener, SessionState};
pub use sender::{ConnectionSender, RouteSink, RoutedSender, Sender, SenderId};
pub use transport::{Edge, EdgeId, TransportError};
pub use wire::{ProtocolTag, TagError};

// Re-export multiplexer types
pub use mux::{
    ConnectionMux, ConnectionReady, ConnectionState, HandlerError, Multiplexer, MuxCore,
    MuxError, MuxStats, OnDemandController, ProtocolHandler, SecureConnectionMux,
};

// Re-export resolver types
pub use resolver::{
    AddressResolver, Dht, DhtError, DhtRecord, DhtResolver, MissedMapping, ResolveError,
    ResolverSettings, StaticResolver,
};

// Re-export cache types
pub use cache::{CacheEntry, CacheStats, TimedCache};
