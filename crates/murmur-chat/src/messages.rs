//! Chat message persistence and the delivery status state machine.

use crate::{rooms::get_room, ChatError};
use murmur_types::{MessageId, MessageStatus, RoomId, UserId, MAX_MESSAGE_CONTENT_LEN};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, receiver_id, content, status, \
                               sent_at, delivered_at, seen_at";

/// A chat message and its delivery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub status: MessageStatus,
    pub sent_at: String,
    pub delivered_at: Option<String>,
    pub seen_at: Option<String>,
}

/// Result of [`update_message_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// The message as stored after the call.
    pub message: ChatMessage,
    /// Whether the call wrote anything. `false` for repeats and downgrades.
    pub changed: bool,
}

/// Appends a message to a room with status `SENT`.
///
/// The sender must be one of the room's participants and the receiver must
/// be the other one. `sent_at` is assigned by the store and never falls
/// behind the room's latest message, even if the wall clock steps back.
pub fn append_message(
    conn: &Connection,
    room_id: RoomId,
    sender_id: UserId,
    receiver_id: UserId,
    content: &str,
) -> Result<ChatMessage, ChatError> {
    let room = get_room(conn, room_id)?;

    let expected_receiver = room
        .other_participant(sender_id)
        .ok_or(ChatError::InvalidParticipant {
            user_id: sender_id,
            room_id,
        })?;
    if receiver_id != expected_receiver {
        return Err(ChatError::InvalidParticipant {
            user_id: receiver_id,
            room_id,
        });
    }

    if content.trim().is_empty() {
        return Err(ChatError::InvalidContent("message body is blank"));
    }
    if content.len() > MAX_MESSAGE_CONTENT_LEN {
        return Err(ChatError::InvalidContent("message body is too long"));
    }

    let message = conn.query_row(
        &format!(
            "INSERT INTO chat_messages
                (room_id, sender_id, receiver_id, content, status, status_rank, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, MAX(
                strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                COALESCE((SELECT MAX(sent_at) FROM chat_messages WHERE room_id = ?1), '')
             ))
             RETURNING {MESSAGE_COLUMNS}"
        ),
        params![
            room_id,
            sender_id,
            receiver_id,
            content,
            MessageStatus::Sent.as_str(),
            MessageStatus::Sent.rank(),
        ],
        map_row_to_message,
    )?;

    tracing::debug!(
        message_id = message.id,
        room_id,
        sender_id,
        receiver_id,
        "chat message stored"
    );
    Ok(message)
}

/// Retrieves a message by id.
pub fn get_message(conn: &Connection, message_id: MessageId) -> Result<ChatMessage, ChatError> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = ?1"),
        [message_id],
        map_row_to_message,
    )
    .optional()?
    .ok_or(ChatError::MessageNotFound(message_id))
}

/// Moves a message forward to `new_status`.
///
/// The check and the write are one conditional `UPDATE`, so concurrent calls
/// on the same row linearize in SQLite. Statuses only move forward: asking
/// for the current status or an earlier one writes nothing and returns the
/// stored record with `changed == false`. `delivered_at` is stamped on entry
/// into `DELIVERED` and `seen_at` on entry into `SEEN`, each at most once.
pub fn update_message_status(
    conn: &Connection,
    message_id: MessageId,
    new_status: MessageStatus,
) -> Result<StatusUpdate, ChatError> {
    let updated = conn
        .query_row(
            &format!(
                "UPDATE chat_messages SET
                    status = ?2,
                    status_rank = ?3,
                    delivered_at = CASE WHEN ?2 = 'DELIVERED'
                        THEN COALESCE(delivered_at, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                        ELSE delivered_at END,
                    seen_at = CASE WHEN ?2 = 'SEEN'
                        THEN COALESCE(seen_at, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                        ELSE seen_at END
                 WHERE id = ?1 AND status_rank < ?3
                 RETURNING {MESSAGE_COLUMNS}"
            ),
            params![message_id, new_status.as_str(), new_status.rank()],
            map_row_to_message,
        )
        .optional()?;

    if let Some(message) = updated {
        tracing::debug!(message_id, status = new_status.as_str(), "message status advanced");
        return Ok(StatusUpdate {
            message,
            changed: true,
        });
    }

    let message = get_message(conn, message_id)?;
    if message.status > new_status {
        tracing::debug!(
            message_id,
            current = message.status.as_str(),
            requested = new_status.as_str(),
            "ignoring status downgrade"
        );
    }
    Ok(StatusUpdate {
        message,
        changed: false,
    })
}

/// Lists a room's messages in the order the store accepted them.
pub fn list_messages_by_room(
    conn: &Connection,
    room_id: RoomId,
) -> Result<Vec<ChatMessage>, ChatError> {
    get_room(conn, room_id)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM chat_messages
         WHERE room_id = ?1
         ORDER BY sent_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map([room_id], map_row_to_message)?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn map_row_to_message(row: &Row) -> rusqlite::Result<ChatMessage> {
    let status: String = row.get(5)?;
    let status = MessageStatus::parse(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ChatMessage {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        content: row.get(4)?,
        status,
        sent_at: row.get(6)?,
        delivered_at: row.get(7)?,
        seen_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{find_or_create_room, test_support::setup_db};

    #[test]
    fn appended_message_starts_as_sent() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");
        let msg = append_message(&conn, room.id, 5, 9, "hi").expect("append");

        let listed = list_messages_by_room(&conn, room.id).expect("list");
        assert_eq!(listed, vec![msg.clone()]);
        assert_eq!(msg.status, MessageStatus::Sent);
        assert!(msg.delivered_at.is_none());
        assert!(msg.seen_at.is_none());
        assert!(!msg.sent_at.is_empty());
    }

    #[test]
    fn append_validates_room_and_participants() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");

        assert!(matches!(
            append_message(&conn, room.id + 1, 5, 9, "hi"),
            Err(ChatError::RoomNotFound(_))
        ));
        assert!(matches!(
            append_message(&conn, room.id, 11, 9, "hi"),
            Err(ChatError::InvalidParticipant { user_id: 11, .. })
        ));
        assert!(matches!(
            append_message(&conn, room.id, 5, 11, "hi"),
            Err(ChatError::InvalidParticipant { user_id: 11, .. })
        ));
        assert!(matches!(
            append_message(&conn, room.id, 5, 5, "hi"),
            Err(ChatError::InvalidParticipant { user_id: 5, .. })
        ));
    }

    #[test]
    fn blank_or_oversized_content_is_rejected() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");

        for blank in ["", "   ", "\n\t"] {
            assert!(matches!(
                append_message(&conn, room.id, 5, 9, blank),
                Err(ChatError::InvalidContent(_))
            ));
        }
        let huge = "x".repeat(MAX_MESSAGE_CONTENT_LEN + 1);
        assert!(matches!(
            append_message(&conn, room.id, 5, 9, &huge),
            Err(ChatError::InvalidContent(_))
        ));
        assert!(list_messages_by_room(&conn, room.id).expect("list").is_empty());
    }

    #[test]
    fn delivered_then_seen() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");
        let msg = append_message(&conn, room.id, 5, 9, "hi").expect("append");

        let delivered = update_message_status(&conn, msg.id, MessageStatus::Delivered)
            .expect("delivered");
        assert!(delivered.changed);
        assert_eq!(delivered.message.status, MessageStatus::Delivered);
        assert!(delivered.message.delivered_at.is_some());
        assert!(delivered.message.seen_at.is_none());

        let seen = update_message_status(&conn, msg.id, MessageStatus::Seen).expect("seen");
        assert!(seen.changed);
        assert_eq!(seen.message.status, MessageStatus::Seen);
        assert!(seen.message.seen_at.is_some());
        assert_eq!(seen.message.delivered_at, delivered.message.delivered_at);
        assert_eq!(seen.message.sent_at, msg.sent_at);
    }

    #[test]
    fn repeated_status_is_a_noop() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");
        let msg = append_message(&conn, room.id, 5, 9, "hi").expect("append");

        let first = update_message_status(&conn, msg.id, MessageStatus::Delivered).expect("first");
        let second =
            update_message_status(&conn, msg.id, MessageStatus::Delivered).expect("second");
        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(second.message, first.message);

        let seen = update_message_status(&conn, msg.id, MessageStatus::Seen).expect("seen");
        for _ in 0..3 {
            let again = update_message_status(&conn, msg.id, MessageStatus::Seen).expect("again");
            assert!(!again.changed);
            assert_eq!(again.message.seen_at, seen.message.seen_at);
        }
    }

    #[test]
    fn downgrade_is_ignored() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");
        let msg = append_message(&conn, room.id, 5, 9, "hi").expect("append");

        let seen = update_message_status(&conn, msg.id, MessageStatus::Seen).expect("seen");
        let back = update_message_status(&conn, msg.id, MessageStatus::Delivered)
            .expect("downgrade returns the record");
        assert!(!back.changed);
        assert_eq!(back.message, seen.message);
        assert_eq!(back.message.status, MessageStatus::Seen);

        let reset = update_message_status(&conn, msg.id, MessageStatus::Sent).expect("reset");
        assert!(!reset.changed);
        assert_eq!(reset.message.status, MessageStatus::Seen);
    }

    #[test]
    fn skipping_delivered_stamps_only_seen() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");
        let msg = append_message(&conn, room.id, 9, 5, "skip").expect("append");

        let seen = update_message_status(&conn, msg.id, MessageStatus::Seen).expect("seen");
        assert!(seen.changed);
        assert!(seen.message.delivered_at.is_none());
        assert!(seen.message.seen_at.is_some());
    }

    #[test]
    fn unknown_message_is_not_found() {
        let conn = setup_db();
        assert!(matches!(
            update_message_status(&conn, 77, MessageStatus::Seen),
            Err(ChatError::MessageNotFound(77))
        ));
    }

    #[test]
    fn room_listing_is_ordered_and_scoped() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");
        let other = find_or_create_room(&conn, 5, 11).expect("other room");

        append_message(&conn, room.id, 5, 9, "one").expect("one");
        append_message(&conn, other.id, 11, 5, "elsewhere").expect("elsewhere");
        append_message(&conn, room.id, 9, 5, "two").expect("two");
        append_message(&conn, room.id, 5, 9, "three").expect("three");

        let listed = list_messages_by_room(&conn, room.id).expect("list");
        let bodies: Vec<&str> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(bodies, ["one", "two", "three"]);
        assert!(listed.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));
    }

    #[test]
    fn sent_at_never_runs_behind_the_room() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");
        let first = append_message(&conn, room.id, 5, 9, "one").expect("one");
        // Simulate a clock that has since stepped backwards.
        conn.execute(
            "UPDATE chat_messages SET sent_at = '2999-01-01T00:00:00.000Z' WHERE id = ?1",
            [first.id],
        )
        .expect("skew");

        let second = append_message(&conn, room.id, 9, 5, "two").expect("two");
        assert_eq!(second.sent_at, "2999-01-01T00:00:00.000Z");

        let listed = list_messages_by_room(&conn, room.id).expect("list");
        let ids: Vec<_> = listed.iter().map(|m| m.id).collect();
        assert_eq!(ids, [first.id, second.id]);
    }

    #[test]
    fn message_serializes_with_camel_case_and_status_label() {
        let conn = setup_db();
        let room = find_or_create_room(&conn, 5, 9).expect("room");
        let msg = append_message(&conn, room.id, 5, 9, "hi").expect("append");
        let json = serde_json::to_value(&msg).expect("json");
        assert_eq!(json["roomId"], room.id);
        assert_eq!(json["status"], "SENT");
        assert!(json["deliveredAt"].is_null());
    }
}
