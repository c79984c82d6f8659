//! Local mirror of the user directory.

use crate::IdentityError;
use murmur_types::UserId;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// A user account as seen by the realtime core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub enabled: bool,
    pub created_at: String,
}

/// Inserts or refreshes a mirrored account row.
///
/// The id is assigned by the upstream user store, so it is written as given.
pub fn upsert_account(
    conn: &Connection,
    id: UserId,
    username: &str,
    enabled: bool,
) -> Result<Account, IdentityError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(IdentityError::BlankUsername);
    }

    let account = conn.query_row(
        "INSERT INTO accounts (id, username, enabled) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET username = excluded.username, enabled = excluded.enabled
         RETURNING id, username, enabled, created_at",
        params![id, username, enabled],
        map_row_to_account,
    )?;
    Ok(account)
}

/// Looks up an account by id.
pub fn get_account(conn: &Connection, id: UserId) -> Result<Account, IdentityError> {
    conn.query_row(
        "SELECT id, username, enabled, created_at FROM accounts WHERE id = ?1",
        [id],
        map_row_to_account,
    )
    .optional()?
    .ok_or(IdentityError::NotFound(id))
}

/// Looks up an account by its unique username.
pub fn get_account_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<Account>, IdentityError> {
    let account = conn
        .query_row(
            "SELECT id, username, enabled, created_at FROM accounts WHERE username = ?1",
            [username],
            map_row_to_account,
        )
        .optional()?;
    Ok(account)
}

/// Enables or disables an account. Disabled accounts cannot open channels.
pub fn set_account_enabled(
    conn: &Connection,
    id: UserId,
    enabled: bool,
) -> Result<(), IdentityError> {
    let changed = conn.execute(
        "UPDATE accounts SET enabled = ?1 WHERE id = ?2",
        params![enabled, id],
    )?;
    if changed == 0 {
        return Err(IdentityError::NotFound(id));
    }
    tracing::info!(user_id = id, enabled, "account enabled flag changed");
    Ok(())
}

fn map_row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        enabled: row.get(2)?,
        created_at: row.get(3)?,
    })
}
