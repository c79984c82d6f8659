//! Durable notification inbox for the Murmur realtime core.
//!
//! Social-graph events (follows, likes, mentions, blocks) become rows in the
//! `notifications` table. This crate owns that table: it renders the message
//! text from the closed [`NotificationKind`](murmur_types::NotificationKind)
//! templates, stores the row, and serves the inbox reads. Live delivery is
//! layered on top by the server and never affects what is stored here.
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`record_notification`] | renders and inserts one unread row |
//! | [`list_for_recipient`] | recipient's rows, newest first |
//! | [`mark_all_read`] | bulk `is_read = 1`, returns rows changed |
//! | [`count_unread`] | number of unread rows |

mod error;
mod store;

pub use error::NotifyError;
pub use store::{count_unread, list_for_recipient, mark_all_read, record_notification, Notification};

#[cfg(test)]
mod tests;
