//! Presence diagnostics.

use crate::error::ApiResponse;
use crate::AppState;
use axum::extract::{Extension, Path};
use axum::response::Json;
use murmur_types::UserId;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsers {
    pub count: usize,
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub user_id: UserId,
    pub online: bool,
}

/// GET /api/presence
pub async fn online_users_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<ApiResponse<OnlineUsers>> {
    let mut user_ids: Vec<UserId> = state.presence.snapshot().into_iter().collect();
    user_ids.sort_unstable();
    ApiResponse::ok(
        "Online users retrieved",
        OnlineUsers {
            count: user_ids.len(),
            user_ids,
        },
    )
}

/// GET /api/presence/{userId}
pub async fn user_presence_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Json<ApiResponse<UserPresence>> {
    ApiResponse::ok(
        "Presence retrieved",
        UserPresence {
            user_id,
            online: state.presence.is_online(user_id),
        },
    )
}
