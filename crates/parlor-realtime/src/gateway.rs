//! Session gateway: authenticate-then-upgrade entry point.
//!
//! The token travels as a query parameter and is verified *before* the
//! WebSocket upgrade, so no partial upgrade ever happens for an
//! unauthenticated peer.

use axum::Json;
use axum::Router;
use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;

use parlor_core::error::{AppError, ErrorKind};

use crate::connection::authenticator::AuthenticatedSession;
use crate::connection::handle::ConnectionHandle;
use crate::connection::socket;
use crate::service::RealtimeService;

/// Query parameters for the WebSocket upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT access token.
    pub token: String,
}

/// Builds the realtime router: the upgrade endpoint plus a liveness probe.
pub fn router(service: RealtimeService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(service)
}

/// GET /healthz liveness probe.
async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /ws?token={jwt} WebSocket upgrade.
async fn ws_handler(
    State(service): State<RealtimeService>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
) -> Result<Response, GatewayError> {
    let auth = service.authenticator().authenticate(&query.token)?;

    let max_frame_bytes = service.config().max_frame_bytes;
    Ok(ws
        .max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| handle_connection(service, auth, socket)))
}

/// Services an established WebSocket connection until it dies.
async fn handle_connection(
    service: RealtimeService,
    auth: AuthenticatedSession,
    socket: WebSocket,
) {
    let config = service.config().clone();
    let (conn, outbound) =
        ConnectionHandle::channel(auth.user_id, auth.username.clone(), config.queue_capacity);

    info!(
        conn_id = %conn.id,
        user_id = %auth.user_id,
        username = %auth.username,
        token_expires_at = %auth.expires_at,
        "WebSocket connection established"
    );

    service.hub().admit(conn.clone()).await;

    let (ws_tx, ws_rx) = socket.split();
    socket::run(
        ws_tx,
        ws_rx,
        conn.clone(),
        outbound,
        service.hub().clone(),
        service.delivery_sink(),
        config,
    )
    .await;

    info!(
        conn_id = %conn.id,
        user_id = %auth.user_id,
        "WebSocket connection closed"
    );
}

/// Standard gateway error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

/// Maps domain errors onto HTTP responses at the gateway boundary.
#[derive(Debug)]
pub struct GatewayError(AppError);

impl From<AppError> for GatewayError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_code) = match self.0.kind {
            ErrorKind::Authentication => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ErrorKind::Protocol => (StatusCode::BAD_REQUEST, "PROTOCOL_ERROR"),
            _ => {
                tracing::error!(error = %self.0.message, "Gateway internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ApiErrorResponse {
            error: error_code.to_string(),
            message: self.0.message,
        };

        (status, Json(body)).into_response()
    }
}
