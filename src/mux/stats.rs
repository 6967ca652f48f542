//! Multiplexer counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct MuxStatsCounters {
    sent: AtomicU64,
    send_failures: AtomicU64,
    unreachable: AtomicU64,
    received: AtomicU64,
    rejected_insecure: AtomicU64,
    dispatch_failures: AtomicU64,
    unresolved_inbound: AtomicU64,
}

impl MuxStatsCounters {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unreachable(&self) {
        self.unreachable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_insecure(&self) {
        self.rejected_insecure.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unresolved_inbound(&self) {
        self.unresolved_inbound.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MuxStats {
        MuxStats {
            sent: self.sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            unreachable: self.unreachable.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            rejected_insecure: self.rejected_insecure.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            unresolved_inbound: self.unresolved_inbound.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time multiplexer statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MuxStats {
    /// Frames handed to a sender successfully.
    pub sent: u64,
    /// Frames whose sender returned an error.
    pub send_failures: u64,
    /// Sends with no sender available.
    pub unreachable: u64,
    /// Payloads dispatched to the handler.
    pub received: u64,
    /// Inbound frames dropped for arriving on a non-session sender.
    pub rejected_insecure: u64,
    /// Handler errors.
    pub dispatch_failures: u64,
    /// Inbound frames whose sender could not be mapped to an address.
    pub unresolved_inbound: u64,
}

/// Per-address traffic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressTraffic {
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub rx_frames: u64,
    pub rx_bytes: u64,
}

impl AddressTraffic {
    pub(crate) fn record_tx(&mut self, len: usize) {
        self.tx_frames += 1;
        self.tx_bytes += len as u64;
    }

    pub(crate) fn record_rx(&mut self, len: usize) {
        self.rx_frames += 1;
        self.rx_bytes += len as u64;
    }
}
