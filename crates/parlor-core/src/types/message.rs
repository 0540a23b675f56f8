//! Chat message domain types shared between the producer side and the
//! realtime engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{MessageId, UserId};

/// Content category of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Image attachment.
    Image,
    /// Video attachment.
    Video,
    /// Generic file attachment.
    File,
}

/// Delivery lifecycle of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Persisted by the server, not yet delivered.
    Sent,
    /// Delivered to the recipient's connection.
    Delivered,
    /// Read by the recipient.
    Read,
}

/// The persisted-message projection a producer hands to the hub for fan-out.
///
/// This is what connected peers see inside a `new_message` envelope. The
/// producer persists the message first; the hub never stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message identifier.
    pub id: MessageId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Author's display name at send time.
    pub sender_username: String,
    /// Direct recipient; `None` for broadcast messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,
    /// Message body.
    pub content: String,
    /// Content category.
    pub message_type: MessageKind,
    /// URL of an attached media object, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Current delivery state.
    pub delivery_status: DeliveryState,
    /// Persistence timestamp.
    pub created_at: DateTime<Utc>,
    /// Whether this message was addressed to everyone.
    pub is_broadcast: bool,
}

/// A delivery/read receipt reported by a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryUpdate {
    /// The message whose state changed.
    pub message_id: MessageId,
    /// The new delivery state.
    pub status: DeliveryState,
    /// When the client observed the change; defaults to receipt time when
    /// the client omits it.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}
