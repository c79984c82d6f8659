//! Error types for the notification store.

use murmur_types::UserId;

/// Errors that can occur during notification store operations.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// A database operation failed.
    #[error("notification database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The sender or recipient has no account row.
    #[error("unknown account: {0}")]
    UnknownAccount(UserId),
}
