//! The tagged wire envelope exchanged over every connection.
//!
//! Wire shape: `{"type": <kind>, "data": <kind-specific>, "timestamp": RFC3339}`.
//! An envelope is serialized exactly once per fan-out and never mutated
//! afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parlor_core::error::AppError;
use parlor_core::types::message::{DeliveryUpdate, MessagePayload};

use super::types::{ErrorDetail, UserStatus};

/// Envelope body, discriminated by the `type` tag with its payload under
/// `data`. `ping`/`pong` carry no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// A chat message fanned out by a producer.
    NewMessage(MessagePayload),
    /// A presence change for some user.
    UserStatus(UserStatus),
    /// A delivery/read receipt reported by a client.
    DeliveryUpdate(DeliveryUpdate),
    /// A protocol error report to a misbehaving peer.
    Error(ErrorDetail),
    /// Application-level keepalive request.
    Ping,
    /// Application-level keepalive response.
    Pong,
}

/// One wire unit: an [`Event`] plus its emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The tagged event body.
    #[serde(flatten)]
    pub event: Event,
    /// Emission time; defaults to receipt time for peers that omit it.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Wrap an event, stamping it with the current time.
    pub fn new(event: Event) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    /// Envelope for a fanned-out chat message.
    pub fn new_message(payload: MessagePayload) -> Self {
        Self::new(Event::NewMessage(payload))
    }

    /// Envelope for a presence change.
    pub fn user_status(status: UserStatus) -> Self {
        Self::new(Event::UserStatus(status))
    }

    /// Envelope reporting a protocol problem to the peer.
    pub fn error(detail: impl Into<String>) -> Self {
        Self::new(Event::Error(ErrorDetail::new(detail)))
    }

    /// Keepalive response envelope.
    pub fn pong() -> Self {
        Self::new(Event::Pong)
    }

    /// Serialize to the wire representation.
    pub fn to_frame(&self) -> Result<String, AppError> {
        serde_json::to_string(self).map_err(AppError::from)
    }

    /// Decode one wire frame.
    pub fn from_frame(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::types::id::{MessageId, UserId};
    use parlor_core::types::message::{DeliveryState, MessageKind};

    fn payload(content: &str) -> MessagePayload {
        MessagePayload {
            id: MessageId::new(),
            sender_id: UserId::new(),
            sender_username: "ada".to_string(),
            recipient_id: None,
            content: content.to_string(),
            message_type: MessageKind::Text,
            media_url: None,
            delivery_status: DeliveryState::Sent,
            created_at: Utc::now(),
            is_broadcast: true,
        }
    }

    #[test]
    fn test_new_message_wire_shape() {
        let frame = Envelope::new_message(payload("hello"))
            .to_frame()
            .expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&frame).expect("valid json");

        assert_eq!(value["type"], "new_message");
        assert_eq!(value["data"]["content"], "hello");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_ping_has_no_data_field() {
        let frame = Envelope::new(Event::Ping).to_frame().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&frame).expect("valid json");

        assert_eq!(value["type"], "ping");
        assert!(value.get("data").is_none());
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_decode_bare_ping() {
        let env = Envelope::from_frame(r#"{"type":"ping"}"#).expect("decode");
        assert!(matches!(env.event, Event::Ping));
    }

    #[test]
    fn test_decode_ping_with_null_data() {
        let env = Envelope::from_frame(r#"{"type":"ping","data":null}"#).expect("decode");
        assert!(matches!(env.event, Event::Ping));
    }

    #[test]
    fn test_decode_delivery_update() {
        let raw = format!(
            r#"{{"type":"delivery_update","data":{{"message_id":"{}","status":"read"}}}}"#,
            MessageId::new()
        );
        let env = Envelope::from_frame(&raw).expect("decode");
        match env.event {
            Event::DeliveryUpdate(update) => assert_eq!(update.status, DeliveryState::Read),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert!(Envelope::from_frame(r#"{"type":"subscribe","data":{}}"#).is_err());
    }

    #[test]
    fn test_user_status_roundtrip() {
        let status = UserStatus {
            user_id: UserId::new(),
            username: "grace".to_string(),
            is_online: true,
            last_seen: Utc::now(),
        };
        let frame = Envelope::user_status(status.clone())
            .to_frame()
            .expect("serialize");
        let env = Envelope::from_frame(&frame).expect("decode");
        match env.event {
            Event::UserStatus(decoded) => {
                assert_eq!(decoded.user_id, status.user_id);
                assert!(decoded.is_online);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
