//! Room lookup for the async surface.

use murmur_chat::{find_or_create_room, get_room, list_rooms_for_user, ChatRoom};
use murmur_db::DbPool;
use murmur_types::{RoomId, UserId};

use crate::{error::ApiError, with_conn};

/// Finds or creates the canonical room for a pair of users.
#[derive(Clone)]
pub struct ChatRoomDirectory {
    pool: DbPool,
}

impl ChatRoomDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Returns the room shared by `user_a` and `user_b`, creating it on first
    /// contact. `(a, b)` and `(b, a)` resolve to the same room.
    pub async fn find_or_create(&self, user_a: UserId, user_b: UserId) -> Result<ChatRoom, ApiError> {
        with_conn(&self.pool, move |conn| {
            Ok(find_or_create_room(conn, user_a, user_b)?)
        })
        .await
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<ChatRoom, ApiError> {
        with_conn(&self.pool, move |conn| Ok(get_room(conn, room_id)?)).await
    }

    /// Returns the room if `user_id` participates in it.
    pub async fn room_for_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<ChatRoom, ApiError> {
        let room = self.get_room(room_id).await?;
        if !room.has_participant(user_id) {
            return Err(ApiError::InvalidParticipant(format!(
                "user {user_id} is not a participant of room {room_id}"
            )));
        }
        Ok(room)
    }

    pub async fn rooms_for(&self, user_id: UserId) -> Result<Vec<ChatRoom>, ApiError> {
        with_conn(&self.pool, move |conn| Ok(list_rooms_for_user(conn, user_id)?)).await
    }
}
