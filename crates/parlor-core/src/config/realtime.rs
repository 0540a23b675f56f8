//! Real-time WebSocket engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) engine configuration.
///
/// Pump timings are in milliseconds. The ping interval must stay strictly
/// shorter than the read timeout or idle peers would be torn down before a
/// heartbeat ever reaches them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound queue capacity per connection, in frames.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Interval between server heartbeat pings, in milliseconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,
    /// Read deadline: a connection with no inbound traffic for this long is
    /// considered dead, in milliseconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Deadline for a single wire write, in milliseconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
    /// Maximum accepted inbound frame size, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl RealtimeConfig {
    /// Heartbeat ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Read deadline as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Per-write deadline as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            ping_interval_ms: default_ping_interval(),
            read_timeout_ms: default_read_timeout(),
            write_timeout_ms: default_write_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_ping_interval() -> u64 {
    30_000
}

fn default_read_timeout() -> u64 {
    60_000
}

fn default_write_timeout() -> u64 {
    10_000
}

fn default_max_frame_bytes() -> usize {
    65_536
}
