//! WebSocket channel: handshake, session loop, and inbound frame handling.

use crate::error::ApiError;
use crate::realtime::OutgoingFrame;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        ConnectInfo, Extension, Query, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use murmur_types::{MessageId, MessageStatus, Principal, RoomId, UserId};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Query parameters for the WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    pub token: Option<String>,
}

/// Frames accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingFrame {
    Subscribe {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    Unsubscribe {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    Message {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        #[serde(rename = "senderId")]
        sender_id: UserId,
        #[serde(rename = "receiverId")]
        receiver_id: UserId,
        content: String,
    },
    Status {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        status: MessageStatus,
    },
}

/// `GET /ws?token=...`
///
/// The handshake is refused with 401 before the upgrade when the token is
/// missing, invalid, expired, or names an unknown or disabled account.
/// Presence is untouched on refusal.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
    Query(params): Query<WsConnectParams>,
) -> impl IntoResponse {
    match state.authenticator.authenticate(params.token.as_deref()).await {
        Ok(principal) => {
            tracing::info!(
                user_id = principal.user_id,
                remote_addr = %addr,
                "websocket auth success"
            );
            ws.on_upgrade(move |socket| handle_socket(socket, state, principal))
        }
        Err(e) => {
            tracing::warn!(remote_addr = %addr, "websocket auth failed: {}", e);
            ApiError::from(e).into_response()
        }
    }
}

/// Queues a frame on this socket's own writer.
fn reply(tx: &mpsc::Sender<String>, frame: &OutgoingFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("failed to queue reply to client: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize reply frame: {}", e);
        }
    }
}

fn reply_error(tx: &mpsc::Sender<String>, err: &ApiError) {
    reply(tx, &OutgoingFrame::error(err.public_message()));
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, principal: Principal) {
    let user_id = principal.user_id;
    let (mut sender, mut receiver) = socket.split();

    // Bounded so a slow reader cannot grow memory without limit.
    let (tx, mut rx) = mpsc::channel::<String>(state.settings.session_buffer.max(1));

    let session_id = state.router.bind(user_id, tx.clone()).await;
    reply(&tx, &OutgoingFrame::Ready { user_id });

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(WsMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<IncomingFrame>(text.as_str()) {
                Ok(frame) => {
                    if let Err(e) = handle_frame(&state, user_id, session_id, frame).await {
                        tracing::debug!(user_id, "frame rejected: {}", e);
                        reply_error(&tx, &e);
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id, "failed to parse incoming frame: {}", e);
                    reply(&tx, &OutgoingFrame::error("invalid frame format"));
                }
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    // A replaced session must not take the newer one offline.
    if !state.router.unbind(user_id, session_id).await {
        tracing::debug!(user_id, %session_id, "stale session closed");
    }
    send_task.abort();
}

async fn handle_frame(
    state: &AppState,
    user_id: UserId,
    session_id: Uuid,
    frame: IncomingFrame,
) -> Result<(), ApiError> {
    match frame {
        IncomingFrame::Subscribe { room_id } => {
            state
                .directory
                .room_for_participant(room_id, user_id)
                .await?;
            if !state
                .router
                .subscribe_session(room_id, user_id, session_id)
                .await
            {
                tracing::debug!(user_id, %session_id, room_id, "ignoring subscribe from stale session");
            }
        }
        IncomingFrame::Unsubscribe { room_id } => {
            if !state
                .router
                .unsubscribe_session(room_id, user_id, session_id)
                .await
            {
                tracing::debug!(user_id, %session_id, room_id, "ignoring unsubscribe from stale session");
            }
        }
        IncomingFrame::Message {
            room_id,
            sender_id,
            receiver_id,
            content,
        } => {
            if sender_id != user_id {
                return Err(ApiError::InvalidParticipant(format!(
                    "sender {sender_id} does not match the connected user"
                )));
            }
            state
                .messages
                .append(room_id, sender_id, receiver_id, content)
                .await?;
        }
        IncomingFrame::Status { message_id, status } => {
            state
                .messages
                .update_status_as(user_id, message_id, status)
                .await?;
        }
    }
    Ok(())
}
