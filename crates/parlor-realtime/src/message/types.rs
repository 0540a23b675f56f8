//! Kind-specific envelope payloads that belong to the realtime engine.
//!
//! Message payloads shared with the producer side (`MessagePayload`,
//! `DeliveryUpdate`) live in `parlor-core::types::message`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parlor_core::types::id::UserId;

/// Presence payload carried by `user_status` envelopes and returned by the
/// hub's online query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatus {
    /// The user whose presence changed.
    pub user_id: UserId,
    /// The user's display name.
    pub username: String,
    /// Whether the user currently holds a live connection.
    pub is_online: bool,
    /// Approximate last-activity time.
    pub last_seen: DateTime<Utc>,
}

/// Payload of an `error` envelope sent to a misbehaving peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable description of the problem.
    pub error: String,
}

impl ErrorDetail {
    /// Create an error payload from a message.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
