//! Hub dispatch counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level metrics counters.
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Total connections ever admitted.
    connections_total: AtomicU64,
    /// Connections currently live.
    connections_active: AtomicU64,
    /// Frames successfully enqueued for delivery.
    messages_sent: AtomicU64,
    /// Frames received from peers.
    messages_received: AtomicU64,
    /// Frames dropped because a peer's queue overflowed or closed.
    messages_dropped: AtomicU64,
}

impl HubMetrics {
    /// Create new zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an admitted connection.
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed connection.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record one frame enqueued for delivery.
    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one frame received from a peer.
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one frame dropped by backpressure.
    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total connections ever admitted.
    pub connections_total: u64,
    /// Connections currently live.
    pub connections_active: u64,
    /// Frames successfully enqueued for delivery.
    pub messages_sent: u64,
    /// Frames received from peers.
    pub messages_received: u64,
    /// Frames dropped by backpressure.
    pub messages_dropped: u64,
}
