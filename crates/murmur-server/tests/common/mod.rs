#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use futures_util::StreamExt;
use murmur_db::{create_pool, run_migrations, DbRuntimeSettings};
use murmur_identity::{upsert_account, SignedTokenService};
use murmur_server::{app, AppState, RuntimeSettings};
use murmur_types::UserId;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::{self, Message};
use tower::ServiceExt;

pub const ADA: UserId = 5;
pub const GRACE: UserId = 9;
pub const LINUS: UserId = 11;
pub const MALLORY: UserId = 12;

pub struct Harness {
    pub state: AppState,
    pub tokens: SignedTokenService,
    _dir: TempDir,
}

/// File-backed database with ada, grace and linus enabled and mallory disabled.
pub fn harness() -> Harness {
    harness_with(RuntimeSettings::default())
}

pub fn harness_with(settings: RuntimeSettings) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("murmur.db");
    let pool = create_pool(path.to_str().expect("utf8 path"), DbRuntimeSettings::default())
        .expect("pool");
    {
        let conn = pool.get().expect("conn");
        run_migrations(&conn).expect("migrations");
        upsert_account(&conn, ADA, "ada", true).expect("ada");
        upsert_account(&conn, GRACE, "grace", true).expect("grace");
        upsert_account(&conn, LINUS, "linus", true).expect("linus");
        upsert_account(&conn, MALLORY, "mallory", false).expect("mallory");
    }

    let tokens = SignedTokenService::new(b"integration-test-secret".to_vec());
    let state = AppState::new(pool, Arc::new(tokens.clone()), settings);
    Harness {
        state,
        tokens,
        _dir: dir,
    }
}

impl Harness {
    pub fn token(&self, user_id: UserId) -> String {
        self.tokens.issue(user_id, 300).expect("issue token")
    }

    pub fn expired_token(&self, user_id: UserId) -> String {
        self.tokens
            .issue_expiring_at(user_id, chrono::Utc::now().timestamp() - 10)
            .expect("issue token")
    }

    pub fn app(&self) -> Router {
        app(self.state.clone())
    }
}

/// Builds a request as if it arrived from 127.0.0.1.
pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).expect("request");
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    req
}

pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Serves the app on an ephemeral port.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = app(state);
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve");
    });
    addr
}

/// Next JSON text frame, failing the test after five seconds.
pub async fn next_frame<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let deadline = Duration::from_secs(5);
    loop {
        let msg = tokio::time::timeout(deadline, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame is json");
        }
    }
}

/// Polls `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition never held: {what}");
}
