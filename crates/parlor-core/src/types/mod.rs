//! Shared domain types.

pub mod id;
pub mod message;

pub use id::{MessageId, UserId};
pub use message::{DeliveryState, DeliveryUpdate, MessageKind, MessagePayload};
