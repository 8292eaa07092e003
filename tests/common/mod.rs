//! Capture server standing in for the push endpoint.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const PUSH_PATH: &str = "/loki/api/v1/push";

#[derive(Clone, Debug)]
pub struct ReceivedPush {
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Clone)]
struct ServerState {
    received: Arc<Mutex<Vec<ReceivedPush>>>,
    status: Arc<AtomicU16>,
}

pub struct CaptureServer {
    pub addr: SocketAddr,
    state: ServerState,
}

impl CaptureServer {
    /// Start on a random local port, answering every push with 204.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind capture server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let state = ServerState {
            received: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(StatusCode::NO_CONTENT.as_u16())),
        };
        let app = Router::new()
            .route(PUSH_PATH, post(capture))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("capture server failed");
        });

        Self { addr, state }
    }

    pub fn push_url(&self) -> String {
        format!("http://{}{}", self.addr, PUSH_PATH)
    }

    /// Status returned for subsequent pushes.
    pub fn respond_with(&self, status: StatusCode) {
        self.state.status.store(status.as_u16(), Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<ReceivedPush> {
        self.state.received.lock().unwrap().clone()
    }

    /// Every pushed line, in arrival order, with its timestamp.
    pub fn values(&self) -> Vec<(String, String)> {
        self.received()
            .iter()
            .flat_map(|push| {
                push.body["streams"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
            })
            .flat_map(|stream| stream["values"].as_array().cloned().unwrap_or_default())
            .map(|value| {
                (
                    value[0].as_str().unwrap_or_default().to_string(),
                    value[1].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    /// Wait until at least `count` lines have arrived.
    pub async fn wait_for_values(&self, count: usize) -> Vec<(String, String)> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let values = self.values();
            if values.len() >= count {
                return values;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} values, have {}",
                count,
                values.len()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

async fn capture(State(state): State<ServerState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);

    state
        .received
        .lock()
        .unwrap()
        .push(ReceivedPush { content_type, body });

    StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
