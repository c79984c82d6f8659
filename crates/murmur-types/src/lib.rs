//! Shared identifiers and closed enumerations for the Murmur realtime core.
//!
//! Every other crate in the workspace depends on `murmur-types` for the
//! vocabulary it shares with its neighbours: user and room identifiers, the
//! message delivery status lattice, and the notification kinds raised by the
//! social graph. Keeping them here prevents the storage crates and the server
//! from growing parallel definitions that drift apart.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a user account, owned by the external user store.
pub type UserId = i64;

/// Identifier of a one-to-one chat room.
pub type RoomId = i64;

/// Identifier of a chat message.
pub type MessageId = i64;

/// Maximum accepted chat message body, in bytes.
pub const MAX_MESSAGE_CONTENT_LEN: usize = 64 * 1024;

/// The authenticated identity bound to a realtime channel or HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// The resolved account id.
    pub user_id: UserId,
}

impl Principal {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Error returned when a stored or wire string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Which enumeration was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Delivery status of a chat message.
///
/// Statuses are ordered `Sent < Delivered < Seen`; a message only ever moves
/// forward through this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Accepted by the store.
    Sent,
    /// Received by the recipient's client.
    Delivered,
    /// Read by the recipient.
    Seen,
}

impl MessageStatus {
    /// Returns the canonical storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Seen => "SEEN",
        }
    }

    /// Numeric position in the status order, as stored alongside the label.
    pub fn rank(self) -> i64 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Seen => 2,
        }
    }

    /// Parses a storage label.
    pub fn parse(value: &str) -> Result<Self, UnknownVariant> {
        match value {
            "SENT" => Ok(Self::Sent),
            "DELIVERED" => Ok(Self::Delivered),
            "SEEN" => Ok(Self::Seen),
            other => Err(UnknownVariant {
                kind: "message status",
                value: other.to_string(),
            }),
        }
    }
}

/// Kinds of social-graph events that produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Follow,
    Unfollow,
    FollowBack,
    Block,
    Unblock,
    Like,
    Comment,
    MentionedInPost,
    MentionedInComment,
}

impl NotificationKind {
    /// Every kind, in declaration order.
    pub const ALL: [NotificationKind; 9] = [
        Self::Follow,
        Self::Unfollow,
        Self::FollowBack,
        Self::Block,
        Self::Unblock,
        Self::Like,
        Self::Comment,
        Self::MentionedInPost,
        Self::MentionedInComment,
    ];

    /// Returns the canonical storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Follow => "FOLLOW",
            Self::Unfollow => "UNFOLLOW",
            Self::FollowBack => "FOLLOW_BACK",
            Self::Block => "BLOCK",
            Self::Unblock => "UNBLOCK",
            Self::Like => "LIKE",
            Self::Comment => "COMMENT",
            Self::MentionedInPost => "MENTIONED_IN_POST",
            Self::MentionedInComment => "MENTIONED_IN_COMMENT",
        }
    }

    /// Parses a storage label.
    pub fn parse(value: &str) -> Result<Self, UnknownVariant> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownVariant {
                kind: "notification kind",
                value: value.to_string(),
            })
    }

    /// Renders the human-readable notification text for `sender_username`.
    ///
    /// The match is exhaustive: a new kind does not compile until it has a
    /// template.
    pub fn render(self, sender_username: &str) -> String {
        match self {
            Self::Follow => format!("{sender_username} followed you."),
            Self::Unfollow => format!("{sender_username} unfollowed you."),
            Self::FollowBack => format!("{sender_username} followed you back."),
            Self::Block => format!("{sender_username} blocked you."),
            Self::Unblock => format!("{sender_username} unblocked you."),
            Self::Like => format!("{sender_username} liked your post."),
            Self::Comment => format!("{sender_username} commented on your post."),
            Self::MentionedInPost => format!("{sender_username} mentioned you in a post."),
            Self::MentionedInComment => format!("{sender_username} mentioned you in a comment."),
        }
    }
}
