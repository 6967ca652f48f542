//! Benchmarks for multiplexer map maintenance and resolver cache hits.
//!
//! Run with: cargo bench --bench mux

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use overmux::memory::{MemoryDht, MemoryEdge, MemoryFabric};
use overmux::{
    AddressResolver, ConnectionMux, Dht, DhtRecord, DhtResolver, Edge, Multiplexer, OverlayAddr,
    ProtocolTag, ResolverSettings, Sender,
};
use std::sync::Arc;
use std::time::Duration;

fn make_addr(val: u16) -> OverlayAddr {
    let mut bytes = [0u8; 16];
    bytes[0..2].copy_from_slice(&val.to_le_bytes());
    OverlayAddr::from_bytes(bytes)
}

fn edge_sender(id: u64) -> Sender {
    let edge: Arc<dyn Edge> = MemoryEdge::detached(id);
    Sender::from(edge)
}

/// A multiplexer with `n` addresses mapped to edge senders.
fn populated_mux(n: u16) -> Arc<ConnectionMux> {
    let fabric = MemoryFabric::new(make_addr(u16::MAX));
    let tag = ProtocolTag::new("bench").expect("valid tag");
    let mux = ConnectionMux::new(tag, fabric);
    for i in 0..n {
        mux.core().install(make_addr(i), edge_sender(i as u64));
    }
    mux
}

// ===== Multiplexer Benchmarks =====

fn bench_install(c: &mut Criterion) {
    let mut group = c.benchmark_group("mux_install");

    for &count in &[100u16, 1000] {
        let mux = populated_mux(count);
        let addr = make_addr(count / 2);
        let first = edge_sender(50_000);
        let second = edge_sender(50_001);

        // Alternate senders so every install is a real change
        group.bench_with_input(BenchmarkId::new("replace", count), &count, |b, _| {
            b.iter(|| {
                mux.core().install(black_box(addr), first.clone());
                mux.core().install(black_box(addr), second.clone());
            })
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("mux_lookup");

    for &count in &[100u16, 1000] {
        let mux = populated_mux(count);
        let present = make_addr(count / 2);
        let sender = edge_sender((count / 2) as u64);

        group.bench_with_input(BenchmarkId::new("get_sender", count), &count, |b, _| {
            b.iter(|| mux.get_sender(black_box(&present)))
        });

        group.bench_with_input(BenchmarkId::new("get_address", count), &count, |b, _| {
            b.iter(|| mux.get_address(black_box(&sender)))
        });
    }

    group.finish();
}

// ===== Resolver Benchmarks =====

fn bench_resolve_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    let dht = Arc::new(MemoryDht::new());
    let settings = ResolverSettings {
        refresh_after: None,
        ..Default::default()
    };
    let shared: Arc<dyn Dht> = dht.clone();
    let resolver: DhtResolver<String> =
        DhtResolver::new(shared, settings, runtime.handle().clone());

    let key = "10.0.0.1".to_string();
    dht.put(resolver.dht_key(&key), DhtRecord::new(make_addr(1).to_string(), 600));
    runtime.block_on(async {
        let _ = resolver.resolve(&key);
        tokio::time::sleep(Duration::from_millis(5)).await;
    });

    c.bench_function("resolver_verified_hit", |b| {
        b.iter(|| resolver.resolve(black_box(&key)))
    });
}

criterion_group!(benches, bench_install, bench_lookup, bench_resolve_hit);
criterion_main!(benches);
