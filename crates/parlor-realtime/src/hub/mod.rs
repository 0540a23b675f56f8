//! The connection hub: authoritative membership, identity index, fan-out,
//! and derived presence.

pub mod presence;
pub mod registry;

pub use presence::LastSeenRegistry;
pub use registry::Hub;
