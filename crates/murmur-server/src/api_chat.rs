//! REST surface for rooms and messages.

use crate::error::{ApiError, ApiResponse};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
};
use murmur_chat::{ChatMessage, ChatRoom};
use murmur_types::{MessageId, MessageStatus, Principal, RoomId, UserId};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub user_one_id: UserId,
    pub user_two_id: UserId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: UserId,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// POST /api/chat/rooms
pub async fn create_room_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<Json<ApiResponse<ChatRoom>>, ApiError> {
    if principal.user_id != payload.user_one_id && principal.user_id != payload.user_two_id {
        return Err(ApiError::InvalidParticipant(
            "caller must be one of the room participants".to_string(),
        ));
    }

    let room = state
        .directory
        .find_or_create(payload.user_one_id, payload.user_two_id)
        .await?;
    Ok(ApiResponse::ok("Chat room ready", room))
}

/// GET /api/chat/rooms
pub async fn list_rooms_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<Vec<ChatRoom>>>, ApiError> {
    let rooms = state.directory.rooms_for(principal.user_id).await?;
    Ok(ApiResponse::ok("Chat rooms retrieved", rooms))
}

/// GET /api/chat/rooms/{roomId}/messages
pub async fn list_messages_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>, ApiError> {
    let messages = state
        .messages
        .list_by_room_as(principal.user_id, room_id)
        .await?;
    Ok(ApiResponse::ok("Messages retrieved", messages))
}

/// POST /api/chat/rooms/{roomId}/messages
pub async fn send_message_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChatMessage>>), ApiError> {
    let message = state
        .messages
        .append(
            room_id,
            principal.user_id,
            payload.receiver_id,
            payload.content,
        )
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok("Message sent", message)))
}

/// PUT /api/chat/messages/{messageId}/status
pub async fn update_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(message_id): Path<MessageId>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<ChatMessage>>, ApiError> {
    let status = MessageStatus::parse(payload.status.trim())?;
    let message = state
        .messages
        .update_status_as(principal.user_id, message_id, status)
        .await?;
    Ok(ApiResponse::ok("Message status updated", message))
}
