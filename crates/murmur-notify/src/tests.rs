//! Unit tests for the notification inbox.

use murmur_types::NotificationKind;
use rusqlite::Connection;

use crate::error::NotifyError;
use crate::store::{count_unread, list_for_recipient, mark_all_read, record_notification};

fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .expect("should enable foreign keys");
    murmur_db::run_migrations(&conn).expect("migrations should succeed");
    conn.execute_batch("INSERT INTO accounts (id, username) VALUES (5, 'ada'), (9, 'grace');")
        .expect("should seed accounts");
    conn
}

#[test]
fn record_renders_and_stores_one_row() {
    let conn = test_db();

    let n = record_notification(&conn, 5, 9, NotificationKind::Like).expect("record");
    assert!(n.id > 0);
    assert_eq!(n.message, "ada liked your post.");
    assert_eq!(n.sender_username, "ada");
    assert!(!n.is_read);

    let stored: (String, String, bool) = conn
        .query_row(
            "SELECT message, kind, is_read FROM notifications WHERE id = ?1",
            [n.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("row exists");
    assert_eq!(stored, ("ada liked your post.".to_string(), "LIKE".to_string(), false));
}

#[test]
fn every_kind_gets_its_template() {
    let conn = test_db();
    for kind in NotificationKind::ALL {
        let n = record_notification(&conn, 9, 5, kind).expect("record");
        assert_eq!(n.message, kind.render("grace"));
        assert!(n.message.starts_with("grace "));
    }
    assert_eq!(
        list_for_recipient(&conn, 5).expect("list").len(),
        NotificationKind::ALL.len()
    );
}

#[test]
fn unknown_accounts_are_rejected() {
    let conn = test_db();
    assert!(matches!(
        record_notification(&conn, 404, 9, NotificationKind::Follow),
        Err(NotifyError::UnknownAccount(404))
    ));
    assert!(matches!(
        record_notification(&conn, 5, 404, NotificationKind::Follow),
        Err(NotifyError::UnknownAccount(404))
    ));
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
        .expect("count");
    assert_eq!(rows, 0);
}

#[test]
fn list_is_newest_first_and_scoped_to_recipient() {
    let conn = test_db();
    let first = record_notification(&conn, 5, 9, NotificationKind::Follow).expect("first");
    record_notification(&conn, 9, 5, NotificationKind::FollowBack).expect("other inbox");
    let second = record_notification(&conn, 5, 9, NotificationKind::Comment).expect("second");

    let listed = list_for_recipient(&conn, 9).expect("list");
    let ids: Vec<i64> = listed.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert!(listed.iter().all(|n| n.recipient_id == 9));
    assert_eq!(listed[0].kind, NotificationKind::Comment);
}

#[test]
fn unread_count_tracks_mark_all_read() {
    let conn = test_db();
    assert_eq!(count_unread(&conn, 9).expect("count"), 0);

    for kind in [
        NotificationKind::Like,
        NotificationKind::MentionedInPost,
        NotificationKind::MentionedInComment,
    ] {
        record_notification(&conn, 5, 9, kind).expect("record");
    }
    record_notification(&conn, 9, 5, NotificationKind::Block).expect("record");

    assert_eq!(count_unread(&conn, 9).expect("count"), 3);
    assert_eq!(mark_all_read(&conn, 9).expect("mark"), 3);
    assert_eq!(count_unread(&conn, 9).expect("count"), 0);
    assert_eq!(mark_all_read(&conn, 9).expect("mark again"), 0);

    // Other inboxes are untouched.
    assert_eq!(count_unread(&conn, 5).expect("count"), 1);
    assert!(list_for_recipient(&conn, 9)
        .expect("list")
        .iter()
        .all(|n| n.is_read));
}

#[test]
fn notification_json_shape() {
    let conn = test_db();
    let n = record_notification(&conn, 5, 9, NotificationKind::MentionedInComment).expect("record");
    let json = serde_json::to_value(&n).expect("json");
    assert_eq!(json["type"], "MENTIONED_IN_COMMENT");
    assert_eq!(json["recipientId"], 9);
    assert_eq!(json["isRead"], false);
    assert_eq!(json["message"], "ada mentioned you in a comment.");
}
