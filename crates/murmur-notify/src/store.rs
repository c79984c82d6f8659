//! Persistence operations for the notification inbox.

use murmur_types::{NotificationKind, UserId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::NotifyError;

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub sender_id: UserId,
    pub sender_username: String,
    pub recipient_id: UserId,
    /// Rendered text, e.g. "ada liked your post."
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub created_at: String,
    pub is_read: bool,
}

/// Renders and stores one unread notification.
///
/// Both accounts must exist; the sender's username is read at call time and
/// baked into the stored message.
///
/// # Errors
///
/// Returns `NotifyError::UnknownAccount` if either party is missing and
/// `NotifyError::Database` if the insert fails.
pub fn record_notification(
    conn: &Connection,
    sender_id: UserId,
    recipient_id: UserId,
    kind: NotificationKind,
) -> Result<Notification, NotifyError> {
    let sender_username: String = conn
        .query_row(
            "SELECT username FROM accounts WHERE id = ?1",
            [sender_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(NotifyError::UnknownAccount(sender_id))?;

    let recipient_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?1)",
        [recipient_id],
        |row| row.get(0),
    )?;
    if !recipient_exists {
        return Err(NotifyError::UnknownAccount(recipient_id));
    }

    let message = kind.render(&sender_username);
    let (id, created_at): (i64, String) = conn.query_row(
        "INSERT INTO notifications (sender_id, recipient_id, message, kind)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id, created_at",
        params![sender_id, recipient_id, message, kind.as_str()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    tracing::debug!(
        notification_id = id,
        sender_id,
        recipient_id,
        kind = kind.as_str(),
        "notification stored"
    );

    Ok(Notification {
        id,
        sender_id,
        sender_username,
        recipient_id,
        message,
        kind,
        created_at,
        is_read: false,
    })
}

/// Lists a recipient's notifications, newest first.
pub fn list_for_recipient(
    conn: &Connection,
    recipient_id: UserId,
) -> Result<Vec<Notification>, NotifyError> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.sender_id, a.username, n.recipient_id, n.message, n.kind,
                n.created_at, n.is_read
         FROM notifications n
         JOIN accounts a ON a.id = n.sender_id
         WHERE n.recipient_id = ?1
         ORDER BY n.created_at DESC, n.id DESC",
    )?;

    let rows = stmt.query_map([recipient_id], map_row_to_notification)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Marks every unread notification of `recipient_id` as read.
///
/// Returns the number of rows that changed; a second call returns 0.
pub fn mark_all_read(conn: &Connection, recipient_id: UserId) -> Result<usize, NotifyError> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
        [recipient_id],
    )?;
    tracing::debug!(recipient_id, changed, "notifications marked read");
    Ok(changed)
}

/// Counts `recipient_id`'s unread notifications.
pub fn count_unread(conn: &Connection, recipient_id: UserId) -> Result<u64, NotifyError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
        [recipient_id],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

fn map_row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    let kind: String = row.get(5)?;
    let kind = NotificationKind::parse(&kind).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Notification {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row.get(2)?,
        recipient_id: row.get(3)?,
        message: row.get(4)?,
        kind,
        created_at: row.get(6)?,
        is_read: row.get(7)?,
    })
}
