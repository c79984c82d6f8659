//! Message log service: persist first, then push to open channels.

use murmur_chat::{
    append_message, get_message, get_room, list_messages_by_room, update_message_status,
    ChatError, ChatMessage,
};
use murmur_db::DbPool;
use murmur_types::{MessageId, MessageStatus, RoomId, UserId};

use crate::error::ApiError;
use crate::presence::PresenceRegistry;
use crate::realtime::{OutgoingFrame, PushOutcome, RealtimeRouter};
use crate::with_conn;

/// Appends chat messages and drives their delivery status.
///
/// Storage is the ordering and durability authority. Pushes happen after the
/// write commits and their failures are only logged.
#[derive(Clone)]
pub struct MessageLog {
    pool: DbPool,
    router: RealtimeRouter,
    presence: PresenceRegistry,
}

impl MessageLog {
    pub fn new(pool: DbPool, router: RealtimeRouter, presence: PresenceRegistry) -> Self {
        Self {
            pool,
            router,
            presence,
        }
    }

    /// Stores a new `SENT` message and broadcasts it to the room.
    ///
    /// If the receiver is online but not watching the room, the message is
    /// also pushed to their private destination.
    pub async fn append(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        receiver_id: UserId,
        content: String,
    ) -> Result<ChatMessage, ApiError> {
        let message = with_conn(&self.pool, move |conn| {
            Ok(append_message(conn, room_id, sender_id, receiver_id, &content)?)
        })
        .await?;

        let frame = OutgoingFrame::Message(message.clone());
        let tally = self.router.send_to_room(room_id, &frame).await;
        tracing::debug!(
            message_id = message.id,
            room_id,
            queued = tally.queued,
            failed = tally.failed,
            "chat message broadcast"
        );

        if self.presence.is_online(receiver_id)
            && !self.router.is_subscribed(room_id, receiver_id).await
        {
            match self.router.send_to_user(receiver_id, &frame).await {
                Ok(PushOutcome::Queued) => {}
                Ok(PushOutcome::NoListener) => {
                    tracing::debug!(receiver_id, "receiver went offline before push");
                }
                Err(e) => {
                    tracing::warn!(
                        receiver_id,
                        message_id = message.id,
                        "private message push failed: {}",
                        e
                    );
                }
            }
        }

        Ok(message)
    }

    /// Moves a message forward to `status`.
    ///
    /// Repeats and downgrades return the stored record without writing or
    /// pushing. A real change is broadcast to the room.
    pub async fn update_status(
        &self,
        message_id: MessageId,
        status: MessageStatus,
    ) -> Result<ChatMessage, ApiError> {
        let update = with_conn(&self.pool, move |conn| {
            Ok(update_message_status(conn, message_id, status)?)
        })
        .await?;

        if update.changed {
            self.broadcast_status(&update.message).await;
        }
        Ok(update.message)
    }

    /// Like [`update_status`](Self::update_status), but only for a
    /// participant of the message's room.
    pub async fn update_status_as(
        &self,
        caller: UserId,
        message_id: MessageId,
        status: MessageStatus,
    ) -> Result<ChatMessage, ApiError> {
        let update = with_conn(&self.pool, move |conn| {
            let message = get_message(conn, message_id)?;
            let room = get_room(conn, message.room_id)?;
            if !room.has_participant(caller) {
                return Err(ChatError::InvalidParticipant {
                    user_id: caller,
                    room_id: room.id,
                }
                .into());
            }
            Ok(update_message_status(conn, message_id, status)?)
        })
        .await?;

        if update.changed {
            self.broadcast_status(&update.message).await;
        }
        Ok(update.message)
    }

    /// Lists a room's messages in acceptance order.
    pub async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<ChatMessage>, ApiError> {
        with_conn(&self.pool, move |conn| Ok(list_messages_by_room(conn, room_id)?)).await
    }

    /// Lists a room's messages for one of its participants.
    pub async fn list_by_room_as(
        &self,
        caller: UserId,
        room_id: RoomId,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        with_conn(&self.pool, move |conn| {
            let room = get_room(conn, room_id)?;
            if !room.has_participant(caller) {
                return Err(ChatError::InvalidParticipant {
                    user_id: caller,
                    room_id,
                }
                .into());
            }
            Ok(list_messages_by_room(conn, room_id)?)
        })
        .await
    }

    async fn broadcast_status(&self, message: &ChatMessage) {
        let tally = self
            .router
            .send_to_room(message.room_id, &OutgoingFrame::MessageStatus(message.clone()))
            .await;
        tracing::debug!(
            message_id = message.id,
            room_id = message.room_id,
            status = message.status.as_str(),
            queued = tally.queued,
            failed = tally.failed,
            "message status broadcast"
        );
    }
}
