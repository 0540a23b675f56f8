//! Seam for the external message-update collaborator.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::id::UserId;
use crate::types::message::DeliveryUpdate;

/// Receives delivery/read receipts reported over live connections.
///
/// The realtime engine forwards each decoded `delivery_update` here
/// fire-and-forget: failures are logged by the caller and never surfaced to
/// the reporting peer. Persisting the receipt is this collaborator's
/// responsibility, not the hub's.
#[async_trait]
pub trait DeliveryUpdateSink: Send + Sync {
    /// Apply one receipt reported by `reporter`.
    async fn apply(&self, reporter: UserId, update: DeliveryUpdate) -> AppResult<()>;
}

/// Default sink that records receipts in the log and nothing else.
#[derive(Debug, Default, Clone)]
pub struct LoggingDeliverySink;

#[async_trait]
impl DeliveryUpdateSink for LoggingDeliverySink {
    async fn apply(&self, reporter: UserId, update: DeliveryUpdate) -> AppResult<()> {
        tracing::info!(
            reporter = %reporter,
            message_id = %update.message_id,
            status = ?update.status,
            "Delivery update received"
        );
        Ok(())
    }
}
