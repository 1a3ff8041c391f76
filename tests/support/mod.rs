#![allow(dead_code)]

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::sleep;

pub const PATH_OK: &str = "/api/v1/users";
pub const PATH_TEXT: &str = "/api/v1/plain";
pub const PATH_FAIL: &str = "/api/v1/broken";
pub const PATH_SIGN_UP: &str = "/api/obs/sign-up";
pub const PATH_LOGIN: &str = "/api/v2/auth/login";
pub const PATH_SLOW: &str = "/api/v1/slow";

/// How long the slow route takes to answer
pub const SLOW_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    inner: Arc<ServerStatsInner>,
}

#[derive(Debug, Default)]
struct ServerStatsInner {
    requests_total: AtomicU64,
    saw_json_content_type: AtomicU64,
    sign_ups: AtomicU64,
    logins: AtomicU64,
}

impl ServerStats {
    pub fn requests_total(&self) -> u64 {
        self.inner.requests_total.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.inner.saw_json_content_type.load(Ordering::Relaxed)
    }

    pub fn sign_ups(&self) -> u64 {
        self.inner.sign_ups.load(Ordering::Relaxed)
    }

    pub fn logins(&self) -> u64 {
        self.inner.logins.load(Ordering::Relaxed)
    }

    fn hit(&self, headers: &HeaderMap) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
        if headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
        {
            self.inner
                .saw_json_content_type
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

async fn handle_ok(State(stats): State<ServerStats>, headers: HeaderMap) -> (StatusCode, &'static str) {
    stats.hit(&headers);
    (StatusCode::OK, r#"{"users":[{"id":1}]}"#)
}

async fn handle_text(State(stats): State<ServerStats>, headers: HeaderMap) -> &'static str {
    stats.hit(&headers);
    "Hello World!"
}

async fn handle_fail(State(stats): State<ServerStats>, headers: HeaderMap) -> (StatusCode, &'static str) {
    stats.hit(&headers);
    (StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#)
}

async fn handle_slow(State(stats): State<ServerStats>, headers: HeaderMap) -> &'static str {
    stats.hit(&headers);
    sleep(SLOW_DELAY).await;
    "slow"
}

async fn handle_sign_up(
    State(stats): State<ServerStats>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    stats.hit(&headers);
    let Ok(user) = serde_json::from_slice::<Value>(&body) else {
        return StatusCode::BAD_REQUEST;
    };
    if user.get("email").and_then(Value::as_str).is_some() {
        stats.inner.sign_ups.fetch_add(1, Ordering::Relaxed);
        StatusCode::CREATED
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// 200 for test/password, 401 for other credentials, 500 when a field is missing.
async fn handle_login(
    State(stats): State<ServerStats>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    stats.hit(&headers);
    stats.inner.logins.fetch_add(1, Ordering::Relaxed);

    let Ok(credentials) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, r#"{"error":"bad json"}"#);
    };
    let username = credentials.get("username").and_then(Value::as_str);
    let password = credentials.get("password").and_then(Value::as_str);

    match (username, password) {
        (Some("test"), Some("password")) => (StatusCode::OK, r#"{"token":"abc"}"#),
        (Some(_), Some(_)) => (StatusCode::UNAUTHORIZED, r#"{"error":"invalid credentials"}"#),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"Username and password are required"}"#,
        ),
    }
}

pub fn router(stats: ServerStats) -> Router {
    Router::new()
        .route(PATH_OK, get(handle_ok))
        .route(PATH_TEXT, get(handle_text))
        .route(PATH_FAIL, get(handle_fail))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_SIGN_UP, post(handle_sign_up))
        .route(PATH_LOGIN, post(handle_login))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: ServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let stats = ServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}

/// A local address with nothing listening on it.
pub async fn closed_port_url() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}
