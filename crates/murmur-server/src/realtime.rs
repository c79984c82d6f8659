//! Addressing layer for open channels.
//!
//! Each principal has at most one bound session, represented by the sending
//! half of a bounded queue drained by that socket's writer task. Rooms keep
//! the set of principals currently subscribed to them. Delivery never waits:
//! a full or closed queue is reported to the caller, who logs it.
//!
//! Presence follows the session table: a user is marked online or offline
//! while the session write lock is held, so a close racing a reconnect cannot
//! leave a bound user offline. Lock order is sessions, then
//! room_subscriptions, then user_subscriptions.

use crate::presence::PresenceRegistry;
use murmur_chat::ChatMessage;
use murmur_notify::Notification;
use murmur_types::{RoomId, UserId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Frames the server pushes to clients, as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutgoingFrame {
    /// Sent once after the handshake completes.
    Ready {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// A newly stored chat message.
    Message(ChatMessage),
    /// A chat message whose delivery status changed.
    MessageStatus(ChatMessage),
    Notification(Notification),
    Error { message: String },
}

impl OutgoingFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    fn encode(&self) -> Result<String, PushError> {
        serde_json::to_string(self).map_err(|e| PushError::Encode(e.to_string()))
    }
}

/// Successful outcome of a push to one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued on the principal's session.
    Queued,
    /// No session is bound; the payload was dropped.
    NoListener,
}

/// A push that could not be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("session queue is full")]
    QueueFull,
    #[error("session is closing")]
    Closed,
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Per-room broadcast tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomPush {
    pub queued: usize,
    pub failed: usize,
}

type SessionMap = HashMap<UserId, (Uuid, mpsc::Sender<String>)>;

/// Routes payloads to private and per-room destinations.
#[derive(Clone, Default)]
pub struct RealtimeRouter {
    sessions: Arc<RwLock<SessionMap>>,
    presence: PresenceRegistry,
    /// room -> subscribed principals.
    room_subscriptions: Arc<RwLock<HashMap<RoomId, HashSet<UserId>>>>,
    /// principal -> rooms, for cleanup on unbind.
    user_subscriptions: Arc<RwLock<HashMap<UserId, HashSet<RoomId>>>>,
}

impl RealtimeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router that keeps `presence` in step with its bound sessions.
    pub fn with_presence(presence: PresenceRegistry) -> Self {
        Self {
            presence,
            ..Self::default()
        }
    }

    /// Binds a session to `user_id`, replacing any previous one, and marks
    /// the user online.
    ///
    /// The replaced session's room subscriptions are dropped; its writer task
    /// ends once its queue sender is gone. Returns the new session id.
    pub async fn bind(&self, user_id: UserId, sender: mpsc::Sender<String>) -> Uuid {
        let session_id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        let replaced = sessions.insert(user_id, (session_id, sender)).is_some();
        if replaced {
            self.drop_subscriptions(user_id).await;
            tracing::info!(user_id, "replaced existing realtime session");
        }
        self.presence.connect(user_id);
        session_id
    }

    /// Unbinds `user_id` and marks them offline if `session_id` is still the
    /// bound session.
    ///
    /// Returns `false` when a newer session has taken over, in which case
    /// nothing changes.
    pub async fn unbind(&self, user_id: UserId, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        if !is_bound_session(&sessions, user_id, session_id) {
            return false;
        }
        sessions.remove(&user_id);
        self.drop_subscriptions(user_id).await;
        self.presence.disconnect(user_id);
        true
    }

    pub async fn is_bound(&self, user_id: UserId) -> bool {
        self.sessions.read().await.contains_key(&user_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Adds `user_id` to the room's broadcast set.
    pub async fn subscribe(&self, room_id: RoomId, user_id: UserId) {
        let mut rooms = self.room_subscriptions.write().await;
        rooms.entry(room_id).or_default().insert(user_id);

        let mut users = self.user_subscriptions.write().await;
        users.entry(user_id).or_default().insert(room_id);
    }

    pub async fn unsubscribe(&self, room_id: RoomId, user_id: UserId) {
        let mut rooms = self.room_subscriptions.write().await;
        if let Some(listeners) = rooms.get_mut(&room_id) {
            listeners.remove(&user_id);
            if listeners.is_empty() {
                rooms.remove(&room_id);
            }
        }

        let mut users = self.user_subscriptions.write().await;
        if let Some(joined) = users.get_mut(&user_id) {
            joined.remove(&room_id);
            if joined.is_empty() {
                users.remove(&user_id);
            }
        }
    }

    /// Subscribes on behalf of one session. A session that has been replaced
    /// or unbound changes nothing and gets `false`.
    pub async fn subscribe_session(
        &self,
        room_id: RoomId,
        user_id: UserId,
        session_id: Uuid,
    ) -> bool {
        let sessions = self.sessions.read().await;
        if !is_bound_session(&sessions, user_id, session_id) {
            return false;
        }
        self.subscribe(room_id, user_id).await;
        true
    }

    /// Unsubscribe counterpart of [`Self::subscribe_session`].
    pub async fn unsubscribe_session(
        &self,
        room_id: RoomId,
        user_id: UserId,
        session_id: Uuid,
    ) -> bool {
        let sessions = self.sessions.read().await;
        if !is_bound_session(&sessions, user_id, session_id) {
            return false;
        }
        self.unsubscribe(room_id, user_id).await;
        true
    }

    pub async fn is_subscribed(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.room_subscriptions
            .read()
            .await
            .get(&room_id)
            .is_some_and(|listeners| listeners.contains(&user_id))
    }

    /// Pushes `frame` to the session bound to `user_id`, if any.
    pub async fn send_to_user(
        &self,
        user_id: UserId,
        frame: &OutgoingFrame,
    ) -> Result<PushOutcome, PushError> {
        let payload = frame.encode()?;
        let sessions = self.sessions.read().await;
        match sessions.get(&user_id) {
            Some((_, sender)) => enqueue(sender, payload).map(|()| PushOutcome::Queued),
            None => Ok(PushOutcome::NoListener),
        }
    }

    /// Pushes `frame` to every session subscribed to `room_id`.
    ///
    /// A room with no subscribers is not an error; the tally is simply zero.
    pub async fn send_to_room(&self, room_id: RoomId, frame: &OutgoingFrame) -> RoomPush {
        let payload = match frame.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(room_id, "dropping room frame: {}", e);
                return RoomPush {
                    queued: 0,
                    failed: 1,
                };
            }
        };

        let mut tally = RoomPush::default();
        let sessions = self.sessions.read().await;
        let rooms = self.room_subscriptions.read().await;
        let Some(listeners) = rooms.get(&room_id) else {
            return tally;
        };

        for user_id in listeners {
            let Some((_, sender)) = sessions.get(user_id) else {
                continue;
            };
            match enqueue(sender, payload.clone()) {
                Ok(()) => tally.queued += 1,
                Err(e) => {
                    tally.failed += 1;
                    tracing::warn!(user_id, room_id, "dropping room frame: {}", e);
                }
            }
        }
        tally
    }

    // Callers hold the sessions write lock.
    async fn drop_subscriptions(&self, user_id: UserId) {
        let joined = self.user_subscriptions.read().await.get(&user_id).cloned();
        let Some(joined) = joined else {
            return;
        };

        let mut rooms = self.room_subscriptions.write().await;
        for room_id in &joined {
            if let Some(listeners) = rooms.get_mut(room_id) {
                listeners.remove(&user_id);
                if listeners.is_empty() {
                    rooms.remove(room_id);
                }
            }
        }
        let mut users = self.user_subscriptions.write().await;
        users.remove(&user_id);
    }
}

fn is_bound_session(sessions: &SessionMap, user_id: UserId, session_id: Uuid) -> bool {
    sessions
        .get(&user_id)
        .is_some_and(|(current, _)| *current == session_id)
}

fn enqueue(sender: &mpsc::Sender<String>, payload: String) -> Result<(), PushError> {
    sender.try_send(payload).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => PushError::QueueFull,
        mpsc::error::TrySendError::Closed(_) => PushError::Closed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> OutgoingFrame {
        OutgoingFrame::error("ping")
    }

    #[tokio::test]
    async fn user_without_session_is_no_listener() {
        let router = RealtimeRouter::new();
        assert_eq!(
            router.send_to_user(5, &frame()).await,
            Ok(PushOutcome::NoListener)
        );
    }

    #[tokio::test]
    async fn bound_user_receives_payload() {
        let router = RealtimeRouter::new();
        let (tx, mut rx) = mpsc::channel(4);
        router.bind(5, tx).await;

        assert_eq!(
            router.send_to_user(5, &frame()).await,
            Ok(PushOutcome::Queued)
        );
        let raw = rx.recv().await.expect("payload");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["message"], "ping");
    }

    #[tokio::test]
    async fn full_and_closed_queues_are_errors() {
        let router = RealtimeRouter::new();
        let (tx, rx) = mpsc::channel(1);
        router.bind(5, tx).await;

        assert_eq!(router.send_to_user(5, &frame()).await, Ok(PushOutcome::Queued));
        assert_eq!(
            router.send_to_user(5, &frame()).await,
            Err(PushError::QueueFull)
        );
        drop(rx);
        assert_eq!(router.send_to_user(5, &frame()).await, Err(PushError::Closed));
    }

    #[tokio::test]
    async fn room_broadcast_reaches_only_subscribers() {
        let router = RealtimeRouter::new();
        let (tx5, mut rx5) = mpsc::channel(4);
        let (tx9, mut rx9) = mpsc::channel(4);
        router.bind(5, tx5).await;
        router.bind(9, tx9).await;
        router.subscribe(1, 5).await;

        let tally = router.send_to_room(1, &frame()).await;
        assert_eq!(tally, RoomPush { queued: 1, failed: 0 });
        assert!(rx5.try_recv().is_ok());
        assert!(rx9.try_recv().is_err());

        assert_eq!(router.send_to_room(2, &frame()).await, RoomPush::default());
    }

    #[tokio::test]
    async fn stale_unbind_keeps_newer_session() {
        let router = RealtimeRouter::new();
        let (old_tx, _old_rx) = mpsc::channel(4);
        let (new_tx, mut new_rx) = mpsc::channel(4);

        let old = router.bind(5, old_tx).await;
        router.subscribe(1, 5).await;
        let new = router.bind(5, new_tx).await;
        assert_ne!(old, new);
        assert!(!router.is_subscribed(1, 5).await, "replacement drops subscriptions");

        assert!(!router.unbind(5, old).await);
        assert!(router.is_bound(5).await);
        router.send_to_user(5, &frame()).await.expect("push");
        assert!(new_rx.try_recv().is_ok());

        assert!(router.unbind(5, new).await);
        assert!(!router.is_bound(5).await);
    }

    #[tokio::test]
    async fn presence_tracks_the_bound_session() {
        let presence = PresenceRegistry::new();
        let router = RealtimeRouter::with_presence(presence.clone());
        let (first_tx, _first_rx) = mpsc::channel(4);
        let (second_tx, _second_rx) = mpsc::channel(4);

        // Close of the first channel lands before the reconnect.
        let first = router.bind(5, first_tx).await;
        assert!(presence.is_online(5));
        assert!(router.unbind(5, first).await);
        assert!(!presence.is_online(5));
        let second = router.bind(5, second_tx).await;
        assert!(presence.is_online(5));

        // Close of a replaced channel lands after the reconnect.
        let (third_tx, _third_rx) = mpsc::channel(4);
        let third = router.bind(5, third_tx).await;
        assert!(!router.unbind(5, second).await);
        assert!(presence.is_online(5));
        assert!(router.is_bound(5).await);

        assert!(router.unbind(5, third).await);
        assert!(!presence.is_online(5));
    }

    #[tokio::test]
    async fn replaced_session_cannot_change_subscriptions() {
        let router = RealtimeRouter::new();
        let (old_tx, _old_rx) = mpsc::channel(4);
        let (new_tx, _new_rx) = mpsc::channel(4);

        let old = router.bind(5, old_tx).await;
        assert!(router.subscribe_session(1, 5, old).await);
        let new = router.bind(5, new_tx).await;
        assert!(router.subscribe_session(2, 5, new).await);

        assert!(!router.subscribe_session(3, 5, old).await);
        assert!(!router.is_subscribed(3, 5).await);
        assert!(!router.unsubscribe_session(2, 5, old).await);
        assert!(router.is_subscribed(2, 5).await);

        assert!(router.unsubscribe_session(2, 5, new).await);
        assert!(!router.is_subscribed(2, 5).await);
        router.unbind(5, new).await;
        assert!(!router.subscribe_session(1, 5, new).await);
    }

    #[tokio::test]
    async fn unbind_clears_subscriptions() {
        let router = RealtimeRouter::new();
        let (tx, _rx) = mpsc::channel(4);
        let session = router.bind(5, tx).await;
        router.subscribe(1, 5).await;
        router.subscribe(2, 5).await;
        assert!(router.is_subscribed(2, 5).await);

        router.unbind(5, session).await;
        assert!(!router.is_subscribed(1, 5).await);
        assert!(!router.is_subscribed(2, 5).await);
    }

    #[tokio::test]
    async fn unsubscribe_removes_listener() {
        let router = RealtimeRouter::new();
        router.subscribe(3, 5).await;
        router.unsubscribe(3, 5).await;
        assert!(!router.is_subscribed(3, 5).await);
        router.unsubscribe(3, 5).await;
    }
}
