//! # parlor-realtime
//!
//! Real-time WebSocket engine for Parlor Chat. Provides:
//!
//! - The connection hub: one live connection per user, admitted and evicted
//!   through a single serialized mutation path
//! - Broadcast / direct / multicast fan-out that never blocks on a slow peer
//! - Per-connection read/write pumps with heartbeats and read deadlines
//! - Presence events derived from membership changes
//! - The authenticate-then-upgrade session gateway

pub mod connection;
pub mod gateway;
pub mod hub;
pub mod message;
pub mod metrics;
pub mod service;

pub use connection::authenticator::WsAuthenticator;
pub use connection::handle::ConnectionHandle;
pub use hub::registry::Hub;
pub use message::envelope::Envelope;
pub use service::RealtimeService;
