//! The per-connection pump pair.
//!
//! Each accepted socket is serviced by two independent workers joined only
//! by the connection's bounded outbound queue and its close signal:
//!
//! - the **read pump** drains inbound frames, enforces the read deadline,
//!   and dispatches control messages;
//! - the **write pump** drains the outbound queue onto the wire, coalescing
//!   queued frames into one write, and emits heartbeat pings.
//!
//! The pumps are generic over the socket halves so they can be exercised
//! with channel-backed fakes.

use std::sync::Arc;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use parlor_core::config::realtime::RealtimeConfig;
use parlor_core::traits::delivery::DeliveryUpdateSink;

use crate::hub::registry::Hub;
use crate::message::envelope::{Envelope, Event};
use crate::message::validator;

use super::handle::ConnectionHandle;

/// Drives both pumps until either terminates, then unregisters the
/// connection exactly once. Dropping the finished select arm closes the
/// socket halves, which tears down the peer.
pub async fn run<W, R>(
    ws_tx: W,
    ws_rx: R,
    conn: Arc<ConnectionHandle>,
    outbound: mpsc::Receiver<String>,
    hub: Arc<Hub>,
    delivery_sink: Arc<dyn DeliveryUpdateSink>,
    config: RealtimeConfig,
) where
    W: Sink<Message, Error = axum::Error> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
{
    tokio::select! {
        _ = write_pump(ws_tx, outbound, conn.clone(), &config) => {}
        _ = read_pump(ws_rx, conn.clone(), hub.clone(), delivery_sink, &config) => {}
    }

    hub.evict(&conn).await;
}

/// Reads frames from the wire until a transport failure, close frame, or
/// read-deadline expiry. Every received frame (protocol pongs included)
/// re-arms the deadline.
async fn read_pump<R>(
    mut ws_rx: R,
    conn: Arc<ConnectionHandle>,
    hub: Arc<Hub>,
    delivery_sink: Arc<dyn DeliveryUpdateSink>,
    config: &RealtimeConfig,
) where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let frame = match time::timeout(config.read_timeout(), ws_rx.next()).await {
            Err(_) => {
                warn!(conn_id = %conn.id, user_id = %conn.user_id, "Read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(conn_id = %conn.id, error = %e, "WebSocket read error");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                if let Err(e) = validator::check_frame_size(text.as_str(), config.max_frame_bytes)
                {
                    warn!(conn_id = %conn.id, error = %e, "Closing connection");
                    break;
                }
                hub.metrics().message_received();
                hub.note_activity(conn.user_id);
                handle_text(text.as_str(), &conn, &delivery_sink);
            }
            Message::Binary(_) => {
                reply(&conn, Envelope::error("binary frames are not supported"));
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Keepalive traffic; the deadline was already re-armed.
            }
            Message::Close(_) => break,
        }
    }
}

/// Decodes one text frame and dispatches it by envelope kind.
fn handle_text(raw: &str, conn: &Arc<ConnectionHandle>, delivery_sink: &Arc<dyn DeliveryUpdateSink>) {
    let envelope = match Envelope::from_frame(raw) {
        Ok(envelope) => envelope,
        Err(_) => {
            reply(conn, Envelope::error(describe_bad_frame(raw)));
            return;
        }
    };

    match envelope.event {
        Event::Ping => reply(conn, Envelope::pong()),
        Event::Pong => {}
        Event::DeliveryUpdate(update) => {
            // Fire-and-forget: the collaborator persists (or drops) the
            // receipt; its failures never reach the reporting peer.
            let sink = Arc::clone(delivery_sink);
            let reporter = conn.user_id;
            tokio::spawn(async move {
                if let Err(e) = sink.apply(reporter, update).await {
                    warn!(reporter = %reporter, error = %e, "Delivery update sink failed");
                }
            });
        }
        Event::NewMessage(_) | Event::UserStatus(_) | Event::Error(_) => {
            reply(
                conn,
                Envelope::error("message type not accepted from clients"),
            );
        }
    }
}

/// Builds the error detail for an undecodable frame, distinguishing an
/// unknown kind from malformed JSON.
fn describe_bad_frame(raw: &str) -> String {
    #[derive(Deserialize)]
    struct Probe {
        #[serde(rename = "type")]
        kind: String,
    }

    match serde_json::from_str::<Probe>(raw) {
        Ok(probe) => format!("unsupported message type: {}", probe.kind),
        Err(_) => "invalid message format".to_string(),
    }
}

/// Queues a reply envelope to the peer. A failed enqueue already marked the
/// connection for closure; nothing else to do here.
fn reply(conn: &Arc<ConnectionHandle>, envelope: Envelope) {
    match envelope.to_frame() {
        Ok(frame) => {
            let _ = conn.enqueue(&frame);
        }
        Err(e) => warn!(conn_id = %conn.id, error = %e, "Failed to serialize reply"),
    }
}

/// Drains the outbound queue onto the wire and emits heartbeat pings on a
/// fixed interval strictly shorter than the peer's read deadline. On the
/// close signal, sends a close frame and terminates.
async fn write_pump<W>(
    mut ws_tx: W,
    mut outbound: mpsc::Receiver<String>,
    conn: Arc<ConnectionHandle>,
    config: &RealtimeConfig,
) where
    W: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut heartbeat = time::interval_at(
        Instant::now() + config.ping_interval(),
        config.ping_interval(),
    );

    loop {
        tokio::select! {
            _ = conn.closed() => {
                let _ = time::timeout(config.write_timeout(), ws_tx.send(Message::Close(None))).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(first) = frame else { break };
                let batch = coalesce(first, &mut outbound);
                if !write_frame(&mut ws_tx, Message::Text(batch.into()), &conn, config).await {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if !write_frame(&mut ws_tx, Message::Ping(Bytes::new()), &conn, config).await {
                    break;
                }
            }
        }
    }
}

/// Folds every frame already sitting in the queue into one wire write,
/// newline-separated, to cut per-frame write overhead.
fn coalesce(first: String, outbound: &mut mpsc::Receiver<String>) -> String {
    let mut batch = first;
    while let Ok(next) = outbound.try_recv() {
        batch.push('\n');
        batch.push_str(&next);
    }
    batch
}

/// Performs one wire write under the write deadline. Returns false when the
/// pump must terminate.
async fn write_frame<W>(
    ws_tx: &mut W,
    message: Message,
    conn: &Arc<ConnectionHandle>,
    config: &RealtimeConfig,
) -> bool
where
    W: Sink<Message, Error = axum::Error> + Unpin,
{
    match time::timeout(config.write_timeout(), ws_tx.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(conn_id = %conn.id, error = %e, "WebSocket write failed");
            false
        }
        Err(_) => {
            warn!(conn_id = %conn.id, "Write deadline exceeded");
            false
        }
    }
}
