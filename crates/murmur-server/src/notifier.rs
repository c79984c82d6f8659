//! Notification service: durable write, then a best-effort live push.

use murmur_db::DbPool;
use murmur_notify::{count_unread, list_for_recipient, mark_all_read, record_notification, Notification};
use murmur_types::{NotificationKind, UserId};
use serde::Serialize;

use crate::error::ApiError;
use crate::presence::PresenceRegistry;
use crate::realtime::{OutgoingFrame, PushOutcome, RealtimeRouter};
use crate::with_conn;

/// What happened to the live copy of a stored notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOutcome {
    /// Queued on the recipient's open channel.
    Pushed,
    /// The recipient had no open channel.
    RecipientOffline,
    /// The recipient looked online but the push failed.
    Dropped,
}

/// A stored notification and the fate of its live push.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationReceipt {
    pub notification: Notification,
    pub delivery: DeliveryOutcome,
}

/// Event sink for social-graph activity.
#[derive(Clone)]
pub struct Notifier {
    pool: DbPool,
    router: RealtimeRouter,
    presence: PresenceRegistry,
}

impl Notifier {
    pub fn new(pool: DbPool, router: RealtimeRouter, presence: PresenceRegistry) -> Self {
        Self {
            pool,
            router,
            presence,
        }
    }

    /// Stores a notification for `recipient_id` and pushes it if they are online.
    ///
    /// Only the durable write can fail. Whether the push succeeded is
    /// reported in the receipt and logged, never returned as an error.
    pub async fn send_notification(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        kind: NotificationKind,
    ) -> Result<NotificationReceipt, ApiError> {
        let notification = with_conn(&self.pool, move |conn| {
            Ok(record_notification(conn, sender_id, recipient_id, kind)?)
        })
        .await?;

        let delivery = self.push(&notification).await;
        tracing::info!(
            notification_id = notification.id,
            sender_id,
            recipient_id,
            kind = kind.as_str(),
            delivery = ?delivery,
            "notification processed"
        );

        Ok(NotificationReceipt {
            notification,
            delivery,
        })
    }

    /// Recipient's notifications, newest first.
    pub async fn list_for_user(&self, recipient_id: UserId) -> Result<Vec<Notification>, ApiError> {
        with_conn(&self.pool, move |conn| Ok(list_for_recipient(conn, recipient_id)?)).await
    }

    /// Marks the recipient's inbox read. Returns how many rows changed.
    pub async fn mark_all_read(&self, recipient_id: UserId) -> Result<usize, ApiError> {
        with_conn(&self.pool, move |conn| Ok(mark_all_read(conn, recipient_id)?)).await
    }

    pub async fn count_unread(&self, recipient_id: UserId) -> Result<u64, ApiError> {
        with_conn(&self.pool, move |conn| Ok(count_unread(conn, recipient_id)?)).await
    }

    async fn push(&self, notification: &Notification) -> DeliveryOutcome {
        let recipient_id = notification.recipient_id;
        if !self.presence.is_online(recipient_id) {
            return DeliveryOutcome::RecipientOffline;
        }

        let frame = OutgoingFrame::Notification(notification.clone());
        match self.router.send_to_user(recipient_id, &frame).await {
            Ok(PushOutcome::Queued) => DeliveryOutcome::Pushed,
            Ok(PushOutcome::NoListener) => {
                tracing::debug!(recipient_id, "recipient disconnected before push");
                DeliveryOutcome::RecipientOffline
            }
            Err(e) => {
                tracing::warn!(
                    recipient_id,
                    notification_id = notification.id,
                    "notification push failed: {}",
                    e
                );
                DeliveryOutcome::Dropped
            }
        }
    }
}
