//! Canonical one-to-one rooms.

use crate::ChatError;
use murmur_types::{RoomId, UserId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A conversation between exactly two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: RoomId,
    /// The smaller of the two participant ids.
    pub participant_low: UserId,
    /// The larger of the two participant ids.
    pub participant_high: UserId,
    pub created_at: String,
}

impl ChatRoom {
    pub fn has_participant(&self, user_id: UserId) -> bool {
        user_id == self.participant_low || user_id == self.participant_high
    }

    /// Returns the participant that is not `user_id`, or `None` if `user_id`
    /// is not in the room.
    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.participant_low {
            Some(self.participant_high)
        } else if user_id == self.participant_high {
            Some(self.participant_low)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [UserId; 2] {
        [self.participant_low, self.participant_high]
    }
}

/// Returns the room shared by `user_a` and `user_b`, creating it on first
/// contact.
///
/// Argument order does not matter. Concurrent first-contact calls for the same
/// pair all return the single row that survives the unique constraint.
pub fn find_or_create_room(
    conn: &Connection,
    user_a: UserId,
    user_b: UserId,
) -> Result<ChatRoom, ChatError> {
    if user_a == user_b {
        return Err(ChatError::SelfReference(user_a));
    }
    let (low, high) = (user_a.min(user_b), user_a.max(user_b));

    if let Some(room) = find_room_by_pair(conn, low, high)? {
        return Ok(room);
    }

    for user_id in [low, high] {
        ensure_account_exists(conn, user_id)?;
    }

    let inserted = conn.execute(
        "INSERT INTO chat_rooms (participant_low, participant_high) VALUES (?1, ?2)
         ON CONFLICT(participant_low, participant_high) DO NOTHING",
        params![low, high],
    )?;

    let room = find_room_by_pair(conn, low, high)?
        .ok_or(rusqlite::Error::QueryReturnedNoRows)?;

    if inserted == 1 {
        tracing::info!(room_id = room.id, low, high, "chat room created");
    } else {
        tracing::debug!(room_id = room.id, low, high, "chat room created concurrently");
    }
    Ok(room)
}

/// Retrieves a room by id.
pub fn get_room(conn: &Connection, room_id: RoomId) -> Result<ChatRoom, ChatError> {
    conn.query_row(
        "SELECT id, participant_low, participant_high, created_at
         FROM chat_rooms WHERE id = ?1",
        [room_id],
        map_row_to_room,
    )
    .optional()?
    .ok_or(ChatError::RoomNotFound(room_id))
}

/// Lists every room `user_id` participates in, newest first.
pub fn list_rooms_for_user(conn: &Connection, user_id: UserId) -> Result<Vec<ChatRoom>, ChatError> {
    let mut stmt = conn.prepare(
        "SELECT id, participant_low, participant_high, created_at
         FROM chat_rooms
         WHERE participant_low = ?1 OR participant_high = ?1
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([user_id], map_row_to_room)?;
    let mut rooms = Vec::new();
    for row in rows {
        rooms.push(row?);
    }
    Ok(rooms)
}

fn find_room_by_pair(
    conn: &Connection,
    low: UserId,
    high: UserId,
) -> Result<Option<ChatRoom>, ChatError> {
    let room = conn
        .query_row(
            "SELECT id, participant_low, participant_high, created_at
             FROM chat_rooms WHERE participant_low = ?1 AND participant_high = ?2",
            params![low, high],
            map_row_to_room,
        )
        .optional()?;
    Ok(room)
}

fn ensure_account_exists(conn: &Connection, user_id: UserId) -> Result<(), ChatError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?1)",
        [user_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(ChatError::UserNotFound(user_id))
    }
}

fn map_row_to_room(row: &Row) -> rusqlite::Result<ChatRoom> {
    Ok(ChatRoom {
        id: row.get(0)?,
        participant_low: row.get(1)?,
        participant_high: row.get(2)?,
        created_at: row.get(3)?,
    })
}
