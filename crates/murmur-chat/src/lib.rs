//! One-to-one chat rooms and the message delivery log.
//!
//! Rooms are keyed by the canonical (low, high) ordering of their two
//! participants, so there is at most one room per unordered pair. Messages
//! belong to a room and move forward through `SENT -> DELIVERED -> SEEN`;
//! each timestamp is stamped once, on first entry into its status.
//!
//! All functions here are synchronous and take a borrowed
//! `rusqlite::Connection`; the server runs them on the blocking pool.

mod messages;
mod rooms;

pub use messages::{
    append_message, get_message, list_messages_by_room, update_message_status, ChatMessage,
    StatusUpdate,
};
pub use rooms::{find_or_create_room, get_room, list_rooms_for_user, ChatRoom};

use murmur_types::{MessageId, RoomId, UserId};
use thiserror::Error;

/// Errors that can occur during chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("user not found: {0}")]
    UserNotFound(UserId),
    #[error("chat room not found: {0}")]
    RoomNotFound(RoomId),
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
    #[error("a chat room needs two distinct users, got {0} twice")]
    SelfReference(UserId),
    #[error("user {user_id} is not a participant of room {room_id}")]
    InvalidParticipant { user_id: UserId, room_id: RoomId },
    #[error("invalid message content: {0}")]
    InvalidContent(&'static str),
}

impl ChatError {
    /// Whether the error names a missing room, message, or user.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_) | Self::RoomNotFound(_) | Self::MessageNotFound(_)
        )
    }
}
