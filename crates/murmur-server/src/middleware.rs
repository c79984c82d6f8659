use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use murmur_types::{Principal, UserId};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::ApiError;
use crate::AppState;

const WINDOW: Duration = Duration::from_secs(60);

/// Entries kept before expired windows are evicted.
const EVICTION_THRESHOLD: usize = 10_000;

fn app_state(req: &Request<Body>) -> Result<Arc<AppState>, StatusCode> {
    req.extensions()
        .get::<Arc<AppState>>()
        .cloned()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Authenticates `Authorization: Bearer <token>` and stores the [`Principal`]
/// in the request extensions.
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Response {
    let state = match app_state(&req) {
        Ok(state) => state,
        Err(code) => return code.into_response(),
    };

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    match state.authenticator.authenticate(token.as_deref()).await {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(path = req.uri().path(), "request refused: {}", e);
            ApiError::from(e).into_response()
        }
    }
}

/// Rate limiting key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    Ip(IpAddr),
    User(UserId),
}

/// In-memory fixed-window rate limiter.
#[derive(Clone, Debug, Default)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<RateLimitKey, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the request fits in `key`'s current window.
    pub fn check(&self, key: RateLimitKey, limit: u32) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!("rate limiter lock poisoned, recovering with stale state");
            poisoned.into_inner()
        });
        let now = Instant::now();

        // Drop only expired windows so active limits survive the sweep.
        if state.len() > EVICTION_THRESHOLD {
            state.retain(|_, (_, start)| now.duration_since(*start) <= WINDOW);
        }

        let (count, start) = state.entry(key).or_insert((0, now));
        if now.duration_since(*start) > WINDOW {
            *count = 1;
            *start = now;
            true
        } else {
            *count += 1;
            *count <= limit
        }
    }
}

/// Rejects requests over the per-minute budget with 429.
///
/// Keys on the authenticated principal when `auth_middleware` ran first,
/// otherwise on the peer address.
pub async fn rate_limit_middleware(req: Request<Body>, next: Next) -> Response {
    let state = match app_state(&req) {
        Ok(state) => state,
        Err(code) => return code.into_response(),
    };

    let key = if let Some(principal) = req.extensions().get::<Principal>() {
        RateLimitKey::User(principal.user_id)
    } else if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        RateLimitKey::Ip(addr.ip())
    } else {
        tracing::error!("rate limiter found neither principal nor peer address");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    if !state
        .rate_limiter
        .check(key.clone(), state.settings.requests_per_minute)
    {
        tracing::warn!(key = ?key, "rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }

    next.run(req).await
}
