//! Common Test Utilities for Integration Tests
//!
//! Spawns a live server on an ephemeral port and provides a fake embedded
//! viewer that speaks the wire protocol over a real WebSocket.

use axum::{Json, Router, routing::get};
use futures_util::{SinkExt, StreamExt};
use niivue_bridge::BridgeConfig;
use niivue_bridge::server::{AppState, viewer_routes, ws_handler};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// A server running the full WebSocket + HTTP surface
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self, instance_key: &str) -> String {
        format!("ws://{}/ws/{}", self.addr, instance_key)
    }
}

pub async fn spawn_test_server() -> TestServer {
    spawn_test_server_with(BridgeConfig::default()).await
}

pub async fn spawn_test_server_with(config: BridgeConfig) -> TestServer {
    let state = AppState::with_bridge_config(config);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws/:key", get(ws_handler))
        .with_state(state.clone())
        .merge(Router::new().nest("/api", viewer_routes(state.clone())));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state }
}

/// A scripted embedded viewer on the other side of the bridge
pub struct FakeViewer {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FakeViewer {
    pub async fn connect(server: &TestServer, instance_key: &str) -> Self {
        let (stream, _) = connect_async(server.ws(instance_key))
            .await
            .expect("viewer failed to connect");
        Self { stream }
    }

    pub async fn send_json(&mut self, value: Value) {
        self.stream
            .send(Message::Text(value.to_string().into()))
            .await
            .expect("viewer failed to send");
    }

    /// Signal that the viewer runtime finished constructing
    pub async fn send_ready(&mut self) {
        self.send_json(serde_json::json!({"type": "ready"})).await;
    }

    pub async fn send_voxel_click(&mut self, voxel: [i32; 3], mm: [f64; 3], value: f64, filename: &str) {
        self.send_json(serde_json::json!({
            "type": "voxel_click",
            "body": {
                "voxel": voxel,
                "mm": mm,
                "value": value,
                "filename": filename,
            }
        }))
        .await;
    }

    /// Next text frame from the host, parsed as JSON
    pub async fn next_message(&mut self) -> Value {
        loop {
            let frame = self
                .stream
                .next()
                .await
                .expect("connection closed")
                .expect("websocket error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).expect("host sent invalid JSON");
            }
        }
    }

    /// Collect the next `n` host messages
    pub async fn next_messages(&mut self, n: usize) -> Vec<Value> {
        let mut messages = Vec::with_capacity(n);
        for _ in 0..n {
            messages.push(self.next_message().await);
        }
        messages
    }
}

/// Base64 helper for building render bodies
pub fn b64(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
