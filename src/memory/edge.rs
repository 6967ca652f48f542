//! In-memory edge.

use super::fabric::MemoryFabric;
use crate::transport::{Edge, EdgeId, TransportError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// An edge that records frames and optionally forwards them to a remote
/// fabric, arriving there on the paired edge.
pub struct MemoryEdge {
    id: EdgeId,
    closed: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
    remote: Option<(Weak<MemoryFabric>, EdgeId)>,
}

impl MemoryEdge {
    /// An edge with no remote end; frames are only recorded.
    pub fn detached(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: EdgeId::new(id),
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            remote: None,
        })
    }

    /// An edge delivering to `remote`, arriving on `remote_edge`.
    pub fn linked(id: EdgeId, remote: Weak<MemoryFabric>, remote_edge: EdgeId) -> Arc<Self> {
        Arc::new(Self {
            id,
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            remote: Some((remote, remote_edge)),
        })
    }

    /// Frames sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Close the edge; later sends fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

impl Edge for MemoryEdge {
    fn id(&self) -> EdgeId {
        self.id
    }

    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.id));
        }
        self.sent.lock().push(frame.to_vec());

        if let Some((remote, remote_edge)) = &self.remote {
            let Some(fabric) = remote.upgrade() else {
                return Err(TransportError::SendFailed(format!(
                    "{} remote end gone",
                    self.id
                )));
            };
            fabric.deliver(frame, *remote_edge);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for MemoryEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEdge")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("linked", &self.remote.is_some())
            .finish()
    }
}
