//! The hub: the process-lifetime registry of live connections and the
//! message dispatch engine.
//!
//! All membership mutation funnels through the write side of one lock, so
//! admits and evictions never interleave; fan-out and snapshots share the
//! read side and work on copied handle lists. Enqueueing onto a connection
//! is non-blocking, and a connection whose queue overflows is evicted after
//! the fan-out pass rather than mid-iteration.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use parlor_core::types::id::UserId;
use parlor_core::types::message::MessagePayload;

use crate::connection::handle::{ConnectionHandle, ConnectionId};
use crate::message::envelope::Envelope;
use crate::message::types::UserStatus;
use crate::metrics::HubMetrics;

use super::presence::LastSeenRegistry;

/// Membership set and identity index. The two maps are mutually consistent
/// at every lock release: a connection is a member iff the index can reach
/// it.
#[derive(Debug, Default)]
struct HubState {
    /// All live connections by connection ID.
    members: HashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// Current connection per user; at most one entry per user.
    by_user: HashMap<UserId, Arc<ConnectionHandle>>,
}

/// The singleton connection registry and dispatcher.
#[derive(Debug)]
pub struct Hub {
    /// Membership and index, mutated only under the write lock.
    state: RwLock<HubState>,
    /// Last-activity times for online users.
    last_seen: LastSeenRegistry,
    /// Dispatch counters.
    metrics: Arc<HubMetrics>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            last_seen: LastSeenRegistry::new(),
            metrics: Arc::new(HubMetrics::new()),
        }
    }

    /// Admit a freshly authenticated connection.
    ///
    /// If the user already holds a connection, the old one is removed from
    /// membership and its queue closed inside the same critical section that
    /// installs the new mapping, so at no point are two connections indexed
    /// for one user. A presence-online event goes out once the mutation is
    /// visible.
    pub async fn admit(&self, conn: Arc<ConnectionHandle>) {
        let displaced = {
            let mut state = self.state.write().await;
            let displaced = state.by_user.insert(conn.user_id, conn.clone());
            if let Some(old) = &displaced {
                state.members.remove(&old.id);
                old.close();
            }
            state.members.insert(conn.id, conn.clone());
            displaced
        };

        if let Some(old) = displaced {
            self.metrics.connection_closed();
            info!(
                conn_id = %old.id,
                user_id = %conn.user_id,
                "Replaced existing connection for user"
            );
        }

        self.last_seen.record(conn.user_id);
        self.metrics.connection_opened();
        info!(
            conn_id = %conn.id,
            user_id = %conn.user_id,
            username = %conn.username,
            "Connection admitted"
        );

        self.broadcast_status(conn.user_id, &conn.username, true)
            .await;
    }

    /// Remove a connection from the hub. Idempotent: evicting a connection
    /// that is no longer a member is a no-op and returns false.
    ///
    /// Exactly one presence-offline event is broadcast per successful
    /// eviction, strictly after the membership mutation is visible.
    pub async fn evict(&self, conn: &ConnectionHandle) -> bool {
        let removed = self.remove_member(conn).await;
        if removed {
            self.broadcast_status(conn.user_id, &conn.username, false)
                .await;
        }
        removed
    }

    /// Fan a chat message out to every member.
    pub async fn broadcast_message(&self, payload: MessagePayload) {
        match Envelope::new_message(payload).to_frame() {
            Ok(frame) => {
                let failed = self.fan_out(&frame).await;
                self.drain_evictions(failed).await;
            }
            Err(e) => error!(error = %e, "Failed to serialize broadcast message"),
        }
    }

    /// Deliver a chat message to one user, if connected.
    ///
    /// An offline recipient is expected steady state, not an error: the
    /// delivery silently no-ops.
    pub async fn send_to_user(&self, user_id: UserId, payload: MessagePayload) {
        let target = {
            let state = self.state.read().await;
            state.by_user.get(&user_id).cloned()
        };
        let Some(conn) = target else {
            debug!(user_id = %user_id, "Recipient offline, skipping direct delivery");
            return;
        };

        match Envelope::new_message(payload).to_frame() {
            Ok(frame) => {
                if conn.enqueue(&frame).is_ok() {
                    self.metrics.message_sent();
                } else {
                    self.metrics.message_dropped();
                    self.drain_evictions(vec![conn]).await;
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize direct message"),
        }
    }

    /// Deliver a chat message to each currently connected user of a set.
    /// Absent identities are skipped without error.
    pub async fn send_to_users(&self, user_ids: &[UserId], payload: MessagePayload) {
        let frame = match Envelope::new_message(payload).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to serialize multicast message");
                return;
            }
        };

        let targets: Vec<Arc<ConnectionHandle>> = {
            let state = self.state.read().await;
            user_ids
                .iter()
                .filter_map(|user_id| state.by_user.get(user_id).cloned())
                .collect()
        };

        let mut failed = Vec::new();
        for conn in targets {
            if conn.enqueue(&frame).is_ok() {
                self.metrics.message_sent();
            } else {
                self.metrics.message_dropped();
                failed.push(conn);
            }
        }
        self.drain_evictions(failed).await;
    }

    /// Point-in-time snapshot of who is online.
    pub async fn list_online(&self) -> Vec<UserStatus> {
        let state = self.state.read().await;
        state
            .by_user
            .values()
            .map(|conn| UserStatus {
                user_id: conn.user_id,
                username: conn.username.clone(),
                is_online: true,
                last_seen: self.last_seen.get(conn.user_id).unwrap_or(conn.connected_at),
            })
            .collect()
    }

    /// Whether a user currently holds a live connection.
    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.state.read().await.by_user.contains_key(&user_id)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.members.len()
    }

    /// Number of distinct connected users.
    pub async fn user_count(&self) -> usize {
        self.state.read().await.by_user.len()
    }

    /// Refresh a user's last-activity time.
    pub fn note_activity(&self, user_id: UserId) {
        self.last_seen.record(user_id);
    }

    /// Dispatch counters.
    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }

    /// Close every connection without presence broadcasts. Used during
    /// process shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<ConnectionHandle>> = {
            let mut state = self.state.write().await;
            state.by_user.clear();
            state.members.drain().map(|(_, conn)| conn).collect()
        };
        for conn in &drained {
            conn.close();
            self.metrics.connection_closed();
        }
        info!(count = drained.len(), "All connections closed");
    }

    /// Remove a connection from both maps. Returns false when the connection
    /// was not a member (already evicted).
    async fn remove_member(&self, conn: &ConnectionHandle) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            if state.members.remove(&conn.id).is_none() {
                false
            } else {
                // A stale eviction must not clobber a newer connection
                // indexed for the same user.
                let still_indexed = state
                    .by_user
                    .get(&conn.user_id)
                    .is_some_and(|current| current.id == conn.id);
                if still_indexed {
                    state.by_user.remove(&conn.user_id);
                    self.last_seen.forget(conn.user_id);
                }
                true
            }
        };

        if removed {
            conn.close();
            self.metrics.connection_closed();
            info!(
                conn_id = %conn.id,
                user_id = %conn.user_id,
                "Connection unregistered"
            );
        }
        removed
    }

    /// Attempt to enqueue one serialized frame on every member, returning
    /// the connections whose enqueue failed. The membership is copied under
    /// the read lock and never mutated mid-pass.
    async fn fan_out(&self, frame: &str) -> Vec<Arc<ConnectionHandle>> {
        let members: Vec<Arc<ConnectionHandle>> = {
            let state = self.state.read().await;
            state.members.values().cloned().collect()
        };

        let mut failed = Vec::new();
        for conn in members {
            if conn.enqueue(frame).is_ok() {
                self.metrics.message_sent();
            } else {
                self.metrics.message_dropped();
                failed.push(conn);
            }
        }
        failed
    }

    /// Evict every connection that failed a fan-out pass. Each eviction
    /// broadcasts a presence-offline event, which may itself overflow
    /// further queues; the loop runs until no new failures appear.
    async fn drain_evictions(&self, mut pending: Vec<Arc<ConnectionHandle>>) {
        while !pending.is_empty() {
            let mut follow_up = Vec::new();
            for conn in pending {
                if self.remove_member(&conn).await {
                    match Envelope::user_status(self.offline_status(&conn)).to_frame() {
                        Ok(frame) => follow_up.extend(self.fan_out(&frame).await),
                        Err(e) => error!(error = %e, "Failed to serialize presence event"),
                    }
                }
            }
            pending = follow_up;
        }
    }

    /// Broadcast a presence change for a user.
    async fn broadcast_status(&self, user_id: UserId, username: &str, is_online: bool) {
        let status = UserStatus {
            user_id,
            username: username.to_string(),
            is_online,
            last_seen: Utc::now(),
        };
        match Envelope::user_status(status).to_frame() {
            Ok(frame) => {
                let failed = self.fan_out(&frame).await;
                self.drain_evictions(failed).await;
            }
            Err(e) => error!(error = %e, "Failed to serialize presence event"),
        }
    }

    fn offline_status(&self, conn: &ConnectionHandle) -> UserStatus {
        UserStatus {
            user_id: conn.user_id,
            username: conn.username.clone(),
            is_online: false,
            last_seen: Utc::now(),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    use parlor_core::types::id::MessageId;
    use parlor_core::types::message::{DeliveryState, MessageKind};

    use crate::message::envelope::Event;

    fn payload(content: &str) -> MessagePayload {
        MessagePayload {
            id: MessageId::new(),
            sender_id: UserId::new(),
            sender_username: "ada".to_string(),
            recipient_id: None,
            content: content.to_string(),
            message_type: MessageKind::Text,
            media_url: None,
            delivery_status: DeliveryState::Sent,
            created_at: Utc::now(),
            is_broadcast: true,
        }
    }

    fn connect(name: &str, capacity: usize) -> (Arc<ConnectionHandle>, mpsc::Receiver<String>) {
        ConnectionHandle::channel(UserId::new(), name.to_string(), capacity)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            envelopes.push(Envelope::from_frame(&frame).expect("valid envelope"));
        }
        envelopes
    }

    fn count_offline_for(envelopes: &[Envelope], user_id: UserId) -> usize {
        envelopes
            .iter()
            .filter(|envelope| match &envelope.event {
                Event::UserStatus(status) => status.user_id == user_id && !status.is_online,
                _ => false,
            })
            .count()
    }

    #[tokio::test]
    async fn test_admit_indexes_connection_and_broadcasts_presence() {
        let hub = Hub::new();
        let (conn, mut rx) = connect("ada", 8);
        let user = conn.user_id;

        hub.admit(conn.clone()).await;

        assert!(hub.is_online(user).await);
        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.user_count().await, 1);

        let online = hub.list_online().await;
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].user_id, user);
        assert!(online[0].is_online);

        let envelopes = drain(&mut rx);
        assert_eq!(envelopes.len(), 1);
        match &envelopes[0].event {
            Event::UserStatus(status) => {
                assert_eq!(status.user_id, user);
                assert_eq!(status.username, "ada");
                assert!(status.is_online);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_connection_for_user_replaces_first() {
        let hub = Hub::new();
        let user = UserId::new();
        let (first, mut first_rx) = ConnectionHandle::channel(user, "ada".to_string(), 8);
        let (second, _second_rx) = ConnectionHandle::channel(user, "ada".to_string(), 8);

        hub.admit(first.clone()).await;
        drain(&mut first_rx);

        hub.admit(second.clone()).await;

        // Exactly one connection indexed for the user; the old queue closed.
        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.user_count().await, 1);
        assert!(!first.is_open());
        assert!(second.is_open());
        assert!(hub.is_online(user).await);

        let online = hub.list_online().await;
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].user_id, user);

        // The displaced connection's later eviction is a stale no-op and
        // must not remove the replacement from the index.
        assert!(!hub.evict(&first).await);
        assert!(hub.is_online(user).await);
    }

    #[tokio::test]
    async fn test_evict_is_idempotent_and_broadcasts_offline_once() {
        let hub = Hub::new();
        let (observer, mut observer_rx) = connect("observer", 32);
        let (target, _target_rx) = connect("target", 8);
        let target_user = target.user_id;

        hub.admit(observer.clone()).await;
        hub.admit(target.clone()).await;
        drain(&mut observer_rx);

        assert!(hub.evict(&target).await);
        assert!(!hub.evict(&target).await);
        assert!(!hub.evict(&target).await);

        assert!(!target.is_open());
        assert!(!hub.is_online(target_user).await);
        assert_eq!(hub.connection_count().await, 1);

        let envelopes = drain(&mut observer_rx);
        assert_eq!(count_offline_for(&envelopes, target_user), 1);
    }

    #[tokio::test]
    async fn test_direct_delivery_to_offline_user_is_noop() {
        let hub = Hub::new();
        let (bystander, mut bystander_rx) = connect("bystander", 8);
        hub.admit(bystander.clone()).await;
        drain(&mut bystander_rx);

        hub.send_to_user(UserId::new(), payload("anyone home?")).await;

        assert!(drain(&mut bystander_rx).is_empty());
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_direct_frames_arrive_in_enqueue_order() {
        let hub = Hub::new();
        let (conn, mut rx) = connect("ada", 8);
        let user = conn.user_id;
        hub.admit(conn.clone()).await;
        drain(&mut rx);

        for content in ["first", "second", "third"] {
            hub.send_to_user(user, payload(content)).await;
        }

        let contents: Vec<String> = drain(&mut rx)
            .into_iter()
            .map(|envelope| match envelope.event {
                Event::NewMessage(message) => message.content,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_broadcast_evicts_overflowing_connection() {
        let hub = Hub::new();
        let (healthy_a, mut rx_a) = connect("healthy-a", 16);
        let (healthy_b, mut rx_b) = connect("healthy-b", 16);
        // Room for its own presence event and nothing else.
        let (stuck, _stuck_rx) = connect("stuck", 1);
        let stuck_user = stuck.user_id;

        hub.admit(healthy_a.clone()).await;
        hub.admit(healthy_b.clone()).await;
        hub.admit(stuck.clone()).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.broadcast_message(payload("hello everyone")).await;

        // Healthy connections got the message plus the offline event for
        // the overloaded peer; the overloaded peer is gone.
        assert_eq!(hub.connection_count().await, 2);
        assert!(!stuck.is_open());
        assert!(!hub.is_online(stuck_user).await);

        for rx in [&mut rx_a, &mut rx_b] {
            let envelopes = drain(rx);
            let messages: Vec<&Envelope> = envelopes
                .iter()
                .filter(|envelope| matches!(envelope.event, Event::NewMessage(_)))
                .collect();
            assert_eq!(messages.len(), 1);
            match &messages[0].event {
                Event::NewMessage(message) => assert_eq!(message.content, "hello everyone"),
                other => panic!("unexpected event: {other:?}"),
            }
            assert_eq!(count_offline_for(&envelopes, stuck_user), 1);
        }
    }

    #[tokio::test]
    async fn test_multicast_skips_absent_identities() {
        let hub = Hub::new();
        let (present, mut present_rx) = connect("present", 8);
        let (other, mut other_rx) = connect("other", 8);
        let present_user = present.user_id;

        hub.admit(present.clone()).await;
        hub.admit(other.clone()).await;
        drain(&mut present_rx);
        drain(&mut other_rx);

        hub.send_to_users(&[present_user, UserId::new()], payload("psst"))
            .await;

        let received = drain(&mut present_rx);
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0].event, Event::NewMessage(_)));
        assert!(drain(&mut other_rx).is_empty());
        assert_eq!(hub.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_connections() {
        let hub = Hub::new();
        let (a, _rx_a) = connect("a", 8);
        let (b, _rx_b) = connect("b", 8);
        hub.admit(a.clone()).await;
        hub.admit(b.clone()).await;

        hub.shutdown().await;

        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.user_count().await, 0);
        assert!(!a.is_open());
        assert!(!b.is_open());
    }

    #[tokio::test]
    async fn test_metrics_track_dispatch() {
        let hub = Hub::new();
        let (conn, mut rx) = connect("ada", 8);
        let user = conn.user_id;
        hub.admit(conn.clone()).await;
        drain(&mut rx);

        hub.send_to_user(user, payload("one")).await;
        hub.send_to_user(user, payload("two")).await;

        let snapshot = hub.metrics().snapshot();
        assert_eq!(snapshot.connections_total, 1);
        assert_eq!(snapshot.connections_active, 1);
        // Two direct messages plus the admission presence broadcast.
        assert_eq!(snapshot.messages_sent, 3);
    }
}
