use crate::bridge::{Bridge, BridgeConfig, ChannelTransport};
use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
    pub transport: Arc<ChannelTransport>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_bridge_config(BridgeConfig::default())
    }

    pub fn with_bridge_config(config: BridgeConfig) -> Self {
        let transport = Arc::new(ChannelTransport::new());
        let bridge = Arc::new(Bridge::with_config(transport.clone(), config));
        Self { bridge, transport }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler; one connection per embedded viewer instance
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(instance_key): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state, instance_key))
}

/// Drive one viewer connection: outbound frames come from the bridge via the
/// channel transport, inbound frames are dispatched back into the bridge.
async fn handle_socket(socket: WebSocket, state: AppState, instance_key: String) {
    let connection_id = Uuid::new_v4();
    info!(
        "viewer connection {} opened for instance {}",
        connection_id, instance_key
    );
    counter!("nvbridge_ws_connections_total").increment(1);

    // Outbound channel for this connection
    let (tx, mut rx) = mpsc::channel::<String>(32);
    state.transport.register(&instance_key, tx.clone()).await;

    // Register the instance so it starts awaiting the ready signal
    state.bridge.attach(&instance_key).await;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward bridge deliveries to the socket
    let send_task = tokio::spawn(async move {
        use futures_util::SinkExt;
        while let Some(json) = rx.recv().await {
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    use futures_util::StreamExt;
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                // protocol violations reported by the viewer surface here;
                // the connection itself stays up
                if let Err(e) = state.bridge.handle_raw(&instance_key, &text).await {
                    warn!("instance {}: {}", instance_key, e);
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(
                    "instance {}: ignoring binary frame from viewer",
                    instance_key
                );
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // keepalive handled by axum
            }
            Ok(Message::Close(_)) => {
                info!("viewer connection {} requested close", connection_id);
                break;
            }
            Err(e) => {
                error!("websocket error for {}: {}", connection_id, e);
                break;
            }
        }
    }

    // Cleanup
    send_task.abort();
    state.transport.unregister(&instance_key, &tx).await;
    state.bridge.on_disconnect(&instance_key).await;

    info!(
        "viewer connection {} closed for instance {}",
        connection_id, instance_key
    );
}
