//! Exposes an in-process stand-in for an etcd member's JSON gateway.
//!
//! ```
//! use kvbench_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let endpoint = server.endpoint();
//!    // point a connector at the endpoint...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;

/// gRPC status code for invalid arguments.
const CODE_INVALID_ARGUMENT: i32 = 3;
/// gRPC status code for an unavailable service.
const CODE_UNAVAILABLE: i32 = 14;

#[derive(Debug, Default)]
struct ServerState {
    store: Mutex<HashMap<String, String>>,
    revision: AtomicU64,
    latency: Duration,
    unavailable: AtomicBool,
}

/// An in-process etcd gateway for use in integration tests.
///
/// It implements just enough of the v3 JSON API for kvbench: `maintenance/status` and `kv/put`.
/// It listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    /// Starts a server that acknowledges every write immediately.
    pub async fn new() -> Self {
        Self::with_latency(Duration::ZERO).await
    }

    /// Starts a server that delays every write by `latency`.
    pub async fn with_latency(latency: Duration) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(ServerState {
            latency,
            ..Default::default()
        });
        let app = Router::new()
            .route("/v3/maintenance/status", post(status))
            .route("/v3/kv/put", post(put))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns the base URL of this member, as a connector expects it.
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.socket.port())
    }

    /// Returns the bare address of this member, as given on the command line.
    pub fn node(&self) -> String {
        format!("127.0.0.1:{}", self.socket.port())
    }

    /// Makes every subsequent write fail with an `unavailable` error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Returns the value stored under `key`, if present.
    pub fn get(&self, key: &str) -> Option<String> {
        self.state.store.lock().unwrap().get(key).cloned()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.state.store.lock().unwrap().len()
    }

    /// Returns `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of acknowledged writes, including overwrites.
    pub fn revision(&self) -> u64 {
        self.state.revision.load(Ordering::Relaxed)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Deserialize)]
struct PutRequest {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
}

fn gateway_error(status: StatusCode, code: i32, message: &str) -> Response {
    let body = json!({ "error": message, "code": code, "message": message });
    (status, Json(body)).into_response()
}

async fn status(State(state): State<Arc<ServerState>>) -> Response {
    let revision = state.revision.load(Ordering::Relaxed);
    Json(json!({ "header": { "revision": revision.to_string() }, "version": "3.5.0" }))
        .into_response()
}

async fn put(State(state): State<Arc<ServerState>>, Json(request): Json<PutRequest>) -> Response {
    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }

    if state.unavailable.load(Ordering::Relaxed) {
        return gateway_error(
            StatusCode::SERVICE_UNAVAILABLE,
            CODE_UNAVAILABLE,
            "etcdserver: no leader",
        );
    }

    let decode = |field: &str| {
        STANDARD
            .decode(field)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    };
    let (Some(key), Some(value)) = (decode(&request.key), decode(&request.value)) else {
        return gateway_error(
            StatusCode::BAD_REQUEST,
            CODE_INVALID_ARGUMENT,
            "invalid base64 payload",
        );
    };
    if key.is_empty() {
        return gateway_error(
            StatusCode::BAD_REQUEST,
            CODE_INVALID_ARGUMENT,
            "etcdserver: key is not provided",
        );
    }

    state.store.lock().unwrap().insert(key, value);
    let revision = state.revision.fetch_add(1, Ordering::Relaxed) + 1;

    Json(json!({ "header": { "revision": revision.to_string() } })).into_response()
}
