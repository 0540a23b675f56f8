//! Engine wiring: the cloneable service handle the gateway and the binary
//! share.

use std::sync::Arc;

use tracing::info;

use parlor_core::config::realtime::RealtimeConfig;
use parlor_core::traits::delivery::DeliveryUpdateSink;

use crate::connection::authenticator::WsAuthenticator;
use crate::hub::registry::Hub;

/// Central realtime service: owns the hub singleton plus the collaborators
/// every connection needs. Cheap to clone; used as axum state.
#[derive(Clone)]
pub struct RealtimeService {
    /// The connection hub.
    hub: Arc<Hub>,
    /// Pre-upgrade token verification.
    authenticator: WsAuthenticator,
    /// External collaborator receiving delivery receipts.
    delivery_sink: Arc<dyn DeliveryUpdateSink>,
    /// Pump and queue tuning.
    config: RealtimeConfig,
}

impl std::fmt::Debug for RealtimeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeService").finish()
    }
}

impl RealtimeService {
    /// Create the service with an empty hub.
    pub fn new(
        config: RealtimeConfig,
        authenticator: WsAuthenticator,
        delivery_sink: Arc<dyn DeliveryUpdateSink>,
    ) -> Self {
        info!("Realtime engine initialized");
        Self {
            hub: Arc::new(Hub::new()),
            authenticator,
            delivery_sink,
            config,
        }
    }

    /// The connection hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The pre-upgrade authenticator.
    pub fn authenticator(&self) -> &WsAuthenticator {
        &self.authenticator
    }

    /// The delivery-receipt collaborator.
    pub fn delivery_sink(&self) -> Arc<dyn DeliveryUpdateSink> {
        Arc::clone(&self.delivery_sink)
    }

    /// Pump and queue tuning.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Close every connection for process shutdown.
    pub async fn shutdown(&self) {
        info!("Shutting down realtime engine");
        self.hub.shutdown().await;
    }
}
