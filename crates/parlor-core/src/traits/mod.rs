//! Trait seams for external collaborators.

pub mod delivery;

pub use delivery::{DeliveryUpdateSink, LoggingDeliverySink};
