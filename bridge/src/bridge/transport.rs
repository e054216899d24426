//! Transport seam between the host and the embedded viewer

use crate::protocol::HostMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

/// Transport errors. Deliveries are never retried; a failure is surfaced to
/// the caller, who decides whether to redraw.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no viewer connected for instance {0}")]
    Disconnected(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// One-way host-to-viewer delivery for a single instance.
///
/// The reverse channel is wired by the transport owner calling back into
/// `Bridge::handle_raw` (see `server::websocket`).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(
        &self,
        instance_key: &str,
        message: &HostMessage,
    ) -> Result<(), TransportError>;
}

/// Routes host messages to per-instance outbound channels.
///
/// The WebSocket layer registers a sender when a viewer connects under a key;
/// the registry is the single mutual-exclusion region guarding insert,
/// lookup and evict.
#[derive(Default)]
pub struct ChannelTransport {
    outbound: RwLock<HashMap<String, mpsc::Sender<String>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the outbound channel for a viewer connection. A reconnecting
    /// viewer replaces the previous channel for its key.
    pub async fn register(&self, instance_key: &str, sender: mpsc::Sender<String>) {
        let mut outbound = self.outbound.write().await;
        if outbound.insert(instance_key.to_string(), sender).is_some() {
            debug!("replacing outbound channel for instance {}", instance_key);
        }
    }

    /// Detach a connection's channel. Only removes the entry if it still
    /// belongs to `sender`, so a reconnect that already replaced the channel
    /// is left untouched.
    pub async fn unregister(&self, instance_key: &str, sender: &mpsc::Sender<String>) {
        let mut outbound = self.outbound.write().await;
        let still_ours = outbound
            .get(instance_key)
            .is_some_and(|current| current.same_channel(sender));
        if still_ours {
            outbound.remove(instance_key);
        }
    }

    pub async fn is_connected(&self, instance_key: &str) -> bool {
        self.outbound.read().await.contains_key(instance_key)
    }

    pub async fn connection_count(&self) -> usize {
        self.outbound.read().await.len()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn deliver(
        &self,
        instance_key: &str,
        message: &HostMessage,
    ) -> Result<(), TransportError> {
        let json = serde_json::to_string(message)?;

        let sender = {
            let outbound = self.outbound.read().await;
            outbound.get(instance_key).cloned()
        }
        .ok_or_else(|| TransportError::Disconnected(instance_key.to_string()))?;

        sender.send(json).await.map_err(|_| {
            TransportError::Delivery(format!(
                "outbound channel closed for instance {}",
                instance_key
            ))
        })
    }
}
