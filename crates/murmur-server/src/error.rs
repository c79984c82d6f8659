//! Error taxonomy shared by the HTTP handlers, the socket loop, and the
//! messaging services.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use murmur_chat::ChatError;
use murmur_notify::NotifyError;
use murmur_types::UnknownVariant;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to the caller of a realtime-core operation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    InvalidParticipant(String),
    #[error("{0}")]
    InvalidContent(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    SelfReference(String),
    /// Well-formed JSON carrying a value outside a closed set.
    #[error("{0}")]
    InvalidRequest(String),
    #[error("too many requests")]
    RateLimited,
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidParticipant(_) => StatusCode::FORBIDDEN,
            Self::InvalidContent(_) | Self::SelfReference(_) | Self::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidParticipant(_) => "INVALID_PARTICIPANT",
            Self::InvalidContent(_) => "INVALID_CONTENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::SelfReference(_) => "SELF_REFERENCE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::RateLimited => "RATE_LIMITED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::UserNotFound(_)
            | ChatError::RoomNotFound(_)
            | ChatError::MessageNotFound(_) => Self::NotFound(e.to_string()),
            ChatError::SelfReference(_) => Self::SelfReference(e.to_string()),
            ChatError::InvalidParticipant { .. } => Self::InvalidParticipant(e.to_string()),
            ChatError::InvalidContent(_) => Self::InvalidContent(e.to_string()),
            ChatError::Database(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<NotifyError> for ApiError {
    fn from(e: NotifyError) -> Self {
        match e {
            NotifyError::UnknownAccount(_) => Self::NotFound(e.to_string()),
            NotifyError::Database(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<UnknownVariant> for ApiError {
    fn from(e: UnknownVariant) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(e: r2d2::Error) -> Self {
        Self::Internal(format!("db connection failed: {e}"))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("task join error: {e}"))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    message: String,
    error_code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            success: false,
            message: self.public_message(),
            error_code: self.code(),
        };
        let mut response = (status, Json(body)).into_response();
        if matches!(self, Self::RateLimited) {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_static("60"),
            );
        }
        response
    }
}

/// Success envelope used by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data,
        })
    }
}
