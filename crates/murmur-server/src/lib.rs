//! Murmur realtime core: HTTP and WebSocket surface plus the services behind it.

pub mod api_chat;
pub mod api_notifications;
pub mod api_presence;
pub mod api_ws;
pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod messaging;
pub mod middleware;
pub mod notifier;
pub mod presence;
pub mod realtime;

use auth::ChannelAuthenticator;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Extension, Json, Router,
};
use directory::ChatRoomDirectory;
use error::ApiError;
use messaging::MessageLog;
use middleware::RateLimiter;
use murmur_db::DbPool;
use murmur_identity::TokenService;
use notifier::Notifier;
use presence::PresenceRegistry;
use realtime::RealtimeRouter;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Maximum request body size (256 KiB). Message content is capped well below this.
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

/// Runtime knobs carried in [`AppState`].
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Outbound frames buffered per socket.
    pub session_buffer: usize,
    /// Requests allowed per rate-limit key per minute.
    pub requests_per_minute: u32,
    /// Upper bound on handshake authentication.
    pub handshake_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            session_buffer: 256,
            requests_per_minute: 600,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    pub presence: PresenceRegistry,
    pub router: RealtimeRouter,
    pub authenticator: ChannelAuthenticator,
    pub directory: ChatRoomDirectory,
    pub messages: MessageLog,
    pub notifier: Notifier,
    /// Rate limiter state.
    pub rate_limiter: RateLimiter,
    pub settings: RuntimeSettings,
}

impl AppState {
    /// Wires the services around one pool, one presence registry and one router.
    pub fn new(pool: DbPool, tokens: Arc<dyn TokenService>, settings: RuntimeSettings) -> Self {
        let presence = PresenceRegistry::new();
        let router = RealtimeRouter::with_presence(presence.clone());
        Self {
            authenticator: ChannelAuthenticator::new(
                tokens,
                pool.clone(),
                settings.handshake_timeout,
            ),
            directory: ChatRoomDirectory::new(pool.clone()),
            messages: MessageLog::new(pool.clone(), router.clone(), presence.clone()),
            notifier: Notifier::new(pool.clone(), router.clone(), presence.clone()),
            rate_limiter: RateLimiter::new(),
            pool,
            presence,
            router,
            settings,
        }
    }
}

/// Runs `f` on a pooled connection off the async runtime.
pub(crate) async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, ApiError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        f(&conn)
    })
    .await?
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // Rate limiting runs inside auth so it can key on the principal.
    let protected_routes = Router::new()
        .route(
            "/api/chat/rooms",
            post(api_chat::create_room_handler).get(api_chat::list_rooms_handler),
        )
        .route(
            "/api/chat/rooms/{roomId}/messages",
            get(api_chat::list_messages_handler).post(api_chat::send_message_handler),
        )
        .route(
            "/api/chat/messages/{messageId}/status",
            put(api_chat::update_status_handler),
        )
        .route(
            "/api/notifications",
            get(api_notifications::list_notifications_handler),
        )
        .route(
            "/api/notifications/mark-all-read",
            post(api_notifications::mark_all_read_handler),
        )
        .route(
            "/api/notifications/unread-count",
            get(api_notifications::unread_count_handler),
        )
        .route(
            "/api/notifications/events",
            post(api_notifications::social_event_handler),
        )
        .route("/api/presence", get(api_presence::online_users_handler))
        .route(
            "/api/presence/{userId}",
            get(api_presence::user_presence_handler),
        )
        .layer(axum::middleware::from_fn(middleware::rate_limit_middleware))
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    let socket_routes = Router::new()
        .route("/ws", get(api_ws::ws_handler))
        .layer(axum::middleware::from_fn(middleware::rate_limit_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .merge(socket_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
