//! REST surface for the notification inbox and the social-graph event sink.

use crate::error::{ApiError, ApiResponse};
use crate::notifier::NotificationReceipt;
use crate::AppState;
use axum::{extract::Extension, http::StatusCode, response::Json};
use murmur_notify::Notification;
use murmur_types::{NotificationKind, Principal, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A social-graph event raised by the caller against `recipient_id`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialEventRequest {
    pub recipient_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: usize,
}

/// GET /api/notifications
pub async fn list_notifications_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<Vec<Notification>>>, ApiError> {
    let notifications = state.notifier.list_for_user(principal.user_id).await?;
    Ok(ApiResponse::ok("Notifications retrieved", notifications))
}

/// POST /api/notifications/mark-all-read
pub async fn mark_all_read_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<MarkedRead>>, ApiError> {
    let updated = state.notifier.mark_all_read(principal.user_id).await?;
    Ok(ApiResponse::ok(
        "All notifications marked as read",
        MarkedRead { updated },
    ))
}

/// GET /api/notifications/unread-count
pub async fn unread_count_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<UnreadCount>>, ApiError> {
    let count = state.notifier.count_unread(principal.user_id).await?;
    Ok(ApiResponse::ok("Unread count retrieved", UnreadCount { count }))
}

/// POST /api/notifications/events
///
/// Accepted once stored; the receipt says whether the live push went out.
pub async fn social_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<SocialEventRequest>,
) -> Result<(StatusCode, Json<ApiResponse<NotificationReceipt>>), ApiError> {
    let kind = NotificationKind::parse(payload.kind.trim())?;
    let receipt = state
        .notifier
        .send_notification(principal.user_id, payload.recipient_id, kind)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        ApiResponse::ok("Notification recorded", receipt),
    ))
}
