//! Overmux simulator
//!
//! Builds an in-memory overlay of several nodes, publishes each node's IP
//! mapping to a shared DHT, and has every node resolve and message every
//! other node through its multiplexer.

use clap::Parser;
use overmux::memory::{MemoryDht, MemoryNetwork, MemorySecurity};
use overmux::{
    AddressResolver, Config, ConnectionMux, Dht, DhtRecord, DhtResolver, HandlerError,
    Multiplexer, OverlayAddr, ProtocolHandler, SecureConnectionMux, Sender,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Overlay multiplexer simulator
#[derive(Parser, Debug)]
#[command(name = "overmux-sim", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of simulated nodes
    #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(2..=254))]
    nodes: u8,

    /// Route all traffic through security sessions
    #[arg(short, long)]
    secure: bool,

    /// Messaging rounds to run
    #[arg(short, long, default_value_t = 3)]
    rounds: u32,
}

/// Counts payloads delivered to one node.
struct Inbox {
    node: OverlayAddr,
    received: AtomicU64,
}

impl ProtocolHandler for Inbox {
    fn handle(&self, payload: &[u8], return_path: &Sender) -> Result<(), HandlerError> {
        self.received.fetch_add(1, Ordering::Relaxed);
        debug!(
            node = %self.node,
            from = %return_path,
            payload = %String::from_utf8_lossy(payload),
            "Payload delivered"
        );
        Ok(())
    }
}

struct SimNode {
    ip: String,
    addr: OverlayAddr,
    mux: Arc<dyn Multiplexer>,
    resolver: DhtResolver<String>,
    inbox: Arc<Inbox>,
}

fn load_config(args: &Args) -> Config {
    let loaded = match &args.config {
        Some(path) => Config::load_file(path).map(|config| (config, vec![path.clone()])),
        None => Config::load(),
    };
    match loaded {
        Ok((config, paths)) => {
            if paths.is_empty() {
                info!("No config files found, using defaults");
            }
            for path in &paths {
                info!(path = %path.display(), "Loaded config file");
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_nodes(
    args: &Args,
    config: &Config,
    network: &MemoryNetwork,
    dht: &Arc<MemoryDht>,
) -> Vec<SimNode> {
    let shared: Arc<dyn Dht> = dht.clone();
    let mut nodes = Vec::new();

    for i in 1..=args.nodes {
        let ip = format!("10.0.0.{}", i);
        let addr = OverlayAddr::derive(ip.as_bytes());
        let fabric = network.add_node(addr);

        let mux: Arc<dyn Multiplexer> = if args.secure {
            let security = MemorySecurity::with_auto_activate();
            fabric.set_security(security.clone());
            match SecureConnectionMux::from_config(&config.mux, fabric, security) {
                Ok(mux) => mux,
                Err(e) => {
                    error!("Failed to create multiplexer: {}", e);
                    std::process::exit(1);
                }
            }
        } else {
            match ConnectionMux::from_config(&config.mux, fabric) {
                Ok(mux) => mux,
                Err(e) => {
                    error!("Failed to create multiplexer: {}", e);
                    std::process::exit(1);
                }
            }
        };

        let inbox = Arc::new(Inbox {
            node: addr,
            received: AtomicU64::new(0),
        });
        mux.subscribe(inbox.clone());

        let resolver = DhtResolver::from_config(shared.clone(), &config.resolver, Handle::current());
        resolver.spawn_sweeper();
        dht.put(resolver.dht_key(&ip), DhtRecord::new(addr.to_string(), 600));

        info!(ip = %ip, addr = %addr, "Node created");
        nodes.push(SimNode {
            ip,
            addr,
            mux,
            resolver,
            inbox,
        });
    }
    nodes
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();
    info!(nodes = args.nodes, secure = args.secure, rounds = args.rounds, "Overmux simulator starting");

    let config = load_config(&args);
    let network = MemoryNetwork::new();
    let dht = Arc::new(MemoryDht::new());
    let nodes = build_nodes(&args, &config, &network, &dht);
    let targets: Vec<String> = nodes.iter().map(|n| n.ip.clone()).collect();

    for round in 1..=args.rounds {
        let mut sent = 0u64;
        for node in &nodes {
            for target in targets.iter().filter(|t| **t != node.ip) {
                match node.resolver.resolve(target) {
                    Ok(Some(addr)) => {
                        let payload = format!("round {} from {}", round, node.ip);
                        if node.mux.send(&addr, payload.as_bytes()) {
                            sent += 1;
                        }
                    }
                    Ok(None) => debug!(from = %node.ip, target = %target, "Not resolved yet"),
                    Err(e) => warn!(from = %node.ip, target = %target, error = %e, "Resolution failed"),
                }
            }
        }
        info!(round, sent, "Round complete");

        // Let lookup completions land before the next round
        tokio::time::sleep(Duration::from_millis(10)).await;

        if let Some(idle) = config.ondemand.idle_timeout() {
            for node in &nodes {
                let released = node.mux.core().ondemand().release_idle(idle);
                if !released.is_empty() {
                    debug!(node = %node.ip, count = released.len(), "Released idle connections");
                }
            }
        }
    }

    for node in &nodes {
        let stats = node.mux.stats();
        info!(
            ip = %node.ip,
            addr = %node.addr,
            sent = stats.sent,
            received = node.inbox.received.load(Ordering::Relaxed),
            unreachable = stats.unreachable,
            rejected = stats.rejected_insecure,
            mapped = node.mux.core().mapped_count(),
            "Node stats"
        );
        node.resolver.stop();
    }

    info!(lookups = dht.lookups(), "Overmux simulator finished");
}
