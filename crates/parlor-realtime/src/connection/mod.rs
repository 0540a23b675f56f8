//! Per-socket connection machinery: the shared handle, the authenticator,
//! and the read/write pump pair.

pub mod authenticator;
pub mod handle;
pub mod socket;

pub use authenticator::{AuthenticatedSession, WsAuthenticator};
pub use handle::{ConnectionHandle, ConnectionId, EnqueueError};
