//! Shared handle to a single live connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use parlor_core::types::id::UserId;

/// Unique connection identifier, minted per accepted socket.
pub type ConnectionId = Uuid;

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// The outbound queue was full; the connection is now closing.
    #[error("outbound queue full")]
    Full,
    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

/// A handle to one live connection.
///
/// Owns the sending side of the bounded outbound queue plus the close
/// signal. The hub and the inbound pump enqueue through it; the outbound
/// pump drains the paired receiver. Queueing is strictly non-blocking: a
/// full queue marks the connection for closure instead of ever making a
/// producer wait.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// User who owns this connection; stable across reconnects.
    pub user_id: UserId,
    /// Display name, cached from the verified token.
    pub username: String,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
    /// Sender for serialized outbound frames.
    sender: mpsc::Sender<String>,
    /// Whether the connection is still accepting frames.
    alive: AtomicBool,
    /// Single-fire close signal observed by the outbound pump.
    closer: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle with a bounded outbound queue, returning the handle
    /// and the receiver the outbound pump drains.
    pub fn channel(
        user_id: UserId,
        username: String,
        queue_capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id,
            username,
            connected_at: Utc::now(),
            sender,
            alive: AtomicBool::new(true),
            closer: CancellationToken::new(),
        });
        (handle, receiver)
    }

    /// Attempt to append a serialized frame to the outbound queue.
    ///
    /// Never blocks. A full queue is a permanent backpressure failure: the
    /// connection is marked for closure and the caller is expected to evict
    /// it from the hub.
    pub fn enqueue(&self, frame: &str) -> Result<(), EnqueueError> {
        if !self.is_open() {
            return Err(EnqueueError::Closed);
        }
        match self.sender.try_send(frame.to_string()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    conn_id = %self.id,
                    user_id = %self.user_id,
                    "Outbound queue full, closing connection"
                );
                self.close();
                Err(EnqueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(EnqueueError::Closed)
            }
        }
    }

    /// Whether the connection still accepts frames.
    pub fn is_open(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Close the connection: stop accepting frames and fire the close
    /// signal. Idempotent.
    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.closer.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closer.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_preserves_order() {
        let (handle, mut rx) = ConnectionHandle::channel(UserId::new(), "ada".to_string(), 4);
        handle.enqueue("a").expect("enqueue a");
        handle.enqueue("b").expect("enqueue b");
        handle.enqueue("c").expect("enqueue c");

        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.as_deref(), Some("b"));
        assert_eq!(rx.recv().await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_full_queue_closes_connection() {
        let (handle, _rx) = ConnectionHandle::channel(UserId::new(), "ada".to_string(), 1);
        handle.enqueue("first").expect("fits");
        assert_eq!(handle.enqueue("second"), Err(EnqueueError::Full));
        assert!(!handle.is_open());
        assert_eq!(handle.enqueue("third"), Err(EnqueueError::Closed));
    }

    #[tokio::test]
    async fn test_close_fires_signal_once() {
        let (handle, _rx) = ConnectionHandle::channel(UserId::new(), "ada".to_string(), 1);
        handle.close();
        handle.close();
        handle.closed().await;
        assert!(!handle.is_open());
    }
}
