//! Keyed bridge registry: request dispatch, readiness handling, event delivery

use crate::bridge::instance::{Instance, InstanceInner, InstanceStatus, Phase, load_sequence};
use crate::bridge::relay;
use crate::bridge::transport::{Transport, TransportError};
use crate::payload::{EncodedRequest, ValidationError, ViewerRequest, encode_request};
use crate::protocol::{InteractionEvent, ViewerMessage};
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Bridge errors. Each failure is scoped to one request or one instance;
/// the bridge stays usable afterwards.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("viewer did not signal ready within {0:?}")]
    InitializationTimeout(Duration),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unknown viewer instance: {0}")]
    UnknownInstance(String),
}

/// What happened to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Load sequence delivered; the viewer now reflects this request
    Delivered { generation: u64 },
    /// Viewer not ready yet; request queued (latest wins) and flushed the
    /// instant `ready` arrives
    Buffered { generation: u64 },
    /// A newer request for the same key replaced this one before delivery
    Superseded { generation: u64 },
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How long `render` waits for the viewer's `ready` signal before
    /// failing with `InitializationTimeout`
    pub ready_timeout: Duration,
    /// Capacity of streaming event subscriber channels
    pub event_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            event_buffer: 16,
        }
    }
}

/// The bridge: a registry of viewer instances keyed by instance key.
///
/// Two requests with the same key address the same logical viewer; a new key
/// spins up a fresh instance. Instances are sequenced independently and may
/// initialize concurrently.
pub struct Bridge {
    instances: RwLock<HashMap<String, Arc<Instance>>>,
    transport: Arc<dyn Transport>,
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, BridgeConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            transport,
            config,
        }
    }

    /// Get or create the protocol state for a key. New embeds transition to
    /// `AwaitingReady` immediately; no data is sent until `ready` arrives.
    pub async fn attach(&self, instance_key: &str) -> Arc<Instance> {
        let existing = {
            let instances = self.instances.read().await;
            instances.get(instance_key).cloned()
        };
        let instance = match existing {
            Some(instance) => instance,
            None => {
                let mut instances = self.instances.write().await;
                // re-check under the write lock
                instances
                    .entry(instance_key.to_string())
                    .or_insert_with(|| {
                        info!("creating viewer instance {}", instance_key);
                        counter!("nvbridge_instances_created_total").increment(1);
                        Instance::new(instance_key)
                    })
                    .clone()
            }
        };

        let mut inner = instance.inner.lock().await;
        if inner.phase == Phase::Uninitialized {
            inner.phase = Phase::AwaitingReady;
            instance.publish(&inner);
            debug!("instance {} awaiting ready", instance_key);
        }
        drop(inner);

        instance
    }

    pub async fn instance(&self, instance_key: &str) -> Option<Arc<Instance>> {
        self.instances.read().await.get(instance_key).cloned()
    }

    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Current protocol progress for a key, if the instance exists
    pub async fn status(&self, instance_key: &str) -> Option<InstanceStatus> {
        Some(self.instance(instance_key).await?.current_status())
    }

    /// Issue a request without waiting for readiness.
    ///
    /// Validation failures block the request before anything is sent. A
    /// request against a `Ready` instance replays the full load sequence (no
    /// incremental diffing); otherwise the request is buffered, replacing any
    /// older buffered one, and flushed when `ready` arrives. Any in-flight
    /// response for the key is superseded either way.
    pub async fn send(&self, request: ViewerRequest) -> Result<SendOutcome, BridgeError> {
        let encoded = encode_request(&request)?;
        let instance = self.attach(&encoded.instance_key).await;
        let mut inner = instance.inner.lock().await;

        inner.supersede();
        inner.latest_generation += 1;
        let generation = inner.latest_generation;
        counter!("nvbridge_requests_total").increment(1);

        if inner.phase == Phase::Ready {
            inner.phase = Phase::Reinitializing;
            instance.publish(&inner);
            self.run_load_sequence(&instance, &mut inner, encoded, generation)
                .await?;
            Ok(SendOutcome::Delivered { generation })
        } else {
            counter!("nvbridge_requests_buffered_total").increment(1);
            if inner.pending.replace(encoded).is_some() {
                debug!(
                    "instance {}: discarding superseded pre-ready request",
                    instance.key
                );
            }
            instance.publish(&inner);
            Ok(SendOutcome::Buffered { generation })
        }
    }

    /// Request/response framing: `send`, then await delivery of this
    /// request's generation, bounded by the configured ready timeout.
    pub async fn render(&self, request: ViewerRequest) -> Result<SendOutcome, BridgeError> {
        let instance_key = request.instance_key.clone();
        match self.send(request).await? {
            SendOutcome::Buffered { generation } => {
                self.wait_delivered(&instance_key, generation).await
            }
            outcome => Ok(outcome),
        }
    }

    async fn wait_delivered(
        &self,
        instance_key: &str,
        generation: u64,
    ) -> Result<SendOutcome, BridgeError> {
        let instance = self
            .instance(instance_key)
            .await
            .ok_or_else(|| BridgeError::UnknownInstance(instance_key.to_string()))?;
        let mut status_rx = instance.subscribe_status();

        let wait = async {
            loop {
                let status = *status_rx.borrow_and_update();
                if status.loaded_generation == generation {
                    return Ok(SendOutcome::Delivered { generation });
                }
                if status.loaded_generation > generation || status.latest_generation > generation {
                    return Ok(SendOutcome::Superseded { generation });
                }
                if status_rx.changed().await.is_err() {
                    return Err(BridgeError::UnknownInstance(instance_key.to_string()));
                }
            }
        };

        match tokio::time::timeout(self.config.ready_timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                counter!("nvbridge_ready_timeouts_total").increment(1);
                warn!(
                    "instance {}: viewer did not signal ready within {:?}",
                    instance_key, self.config.ready_timeout
                );
                Err(BridgeError::InitializationTimeout(self.config.ready_timeout))
            }
        }
    }

    /// Deliver one request's load sequence over the transport.
    ///
    /// A delivery failure is terminal for that request only: the instance is
    /// parked back in `AwaitingReady` with the request queued, so the next
    /// `ready` (a reconnecting viewer) replays it.
    async fn run_load_sequence(
        &self,
        instance: &Arc<Instance>,
        inner: &mut InstanceInner,
        request: EncodedRequest,
        generation: u64,
    ) -> Result<(), BridgeError> {
        let start = Instant::now();
        debug!(
            "instance {}: load sequence start (generation {}, {} layers)",
            instance.key,
            generation,
            request.layer_count()
        );

        for message in load_sequence(&request) {
            if let Err(e) = self.transport.deliver(&instance.key, &message).await {
                warn!(
                    "instance {}: delivery of {} failed: {}",
                    instance.key,
                    message.message_type(),
                    e
                );
                inner.phase = Phase::AwaitingReady;
                inner.pending = Some(request);
                instance.publish(inner);
                return Err(e.into());
            }
        }

        inner.loaded_generation = generation;
        inner.last_delivered = Some(request);
        inner.phase = Phase::Ready;
        instance.publish(inner);

        counter!("nvbridge_load_sequences_total").increment(1);
        histogram!("nvbridge_load_sequence_duration_seconds").record(start.elapsed());
        info!(
            "instance {}: viewer ready (generation {})",
            instance.key, generation
        );
        Ok(())
    }

    /// Dispatch one raw inbound frame from the transport. Frames that do not
    /// parse as a known viewer message are ignored for forward compatibility.
    pub async fn handle_raw(&self, instance_key: &str, text: &str) -> Result<(), BridgeError> {
        match serde_json::from_str::<ViewerMessage>(text) {
            Ok(message) => self.handle_viewer_message(instance_key, message).await,
            Err(_) => {
                debug!(
                    "instance {}: ignoring unrecognized viewer message",
                    instance_key
                );
                Ok(())
            }
        }
    }

    /// Dispatch one parsed viewer message
    pub async fn handle_viewer_message(
        &self,
        instance_key: &str,
        message: ViewerMessage,
    ) -> Result<(), BridgeError> {
        counter!("nvbridge_viewer_messages_total", "type" => message.message_type()).increment(1);

        match message {
            ViewerMessage::Ready => self.on_ready(instance_key).await,
            ViewerMessage::DebugAnswer(body) => {
                debug!("instance {}: debug answer: {}", instance_key, body);
                Ok(())
            }
            ViewerMessage::Error { message } => {
                counter!("nvbridge_protocol_violations_total").increment(1);
                warn!(
                    "instance {}: viewer reported load failure: {}",
                    instance_key, message
                );
                Err(BridgeError::ProtocolViolation(message))
            }
            other => match relay::relay(&other) {
                Some(event) => self.on_event(instance_key, event).await,
                None => Ok(()),
            },
        }
    }

    /// The viewer runtime finished constructing (or reconstructed itself
    /// after a reload). Flush the buffered request if there is one, replay
    /// the last delivered request if not, otherwise sit ready with an empty
    /// canvas.
    async fn on_ready(&self, instance_key: &str) -> Result<(), BridgeError> {
        // the viewer may connect before the host has sent anything
        let instance = self.attach(instance_key).await;
        let mut inner = instance.inner.lock().await;
        debug!(
            "instance {}: ready signal in phase {}",
            instance_key,
            inner.phase.name()
        );

        if let Some(request) = inner.pending.take() {
            let generation = inner.latest_generation;
            inner.phase = if inner.loaded_generation == 0 {
                Phase::Initializing
            } else {
                Phase::Reinitializing
            };
            instance.publish(&inner);
            self.run_load_sequence(&instance, &mut inner, request, generation)
                .await
        } else if let Some(request) = inner.last_delivered.clone() {
            // viewer restart: replay so it reflects the latest request
            let generation = inner.loaded_generation;
            inner.phase = Phase::Reinitializing;
            instance.publish(&inner);
            self.run_load_sequence(&instance, &mut inner, request, generation)
                .await
        } else {
            inner.phase = Phase::Ready;
            instance.publish(&inner);
            Ok(())
        }
    }

    /// Record a relayed interaction event. Clicks raised while a load
    /// sequence is pending belong to a superseded render and are dropped.
    async fn on_event(
        &self,
        instance_key: &str,
        event: InteractionEvent,
    ) -> Result<(), BridgeError> {
        let Some(instance) = self.instance(instance_key).await else {
            warn!("dropping event for unknown instance {}", instance_key);
            return Ok(());
        };
        let mut inner = instance.inner.lock().await;

        if inner.phase != Phase::Ready {
            counter!("nvbridge_events_stale_total").increment(1);
            debug!(
                "instance {}: dropping event in phase {}",
                instance_key,
                inner.phase.name()
            );
            return Ok(());
        }

        counter!("nvbridge_events_total").increment(1);
        inner.deliver_event(event);
        Ok(())
    }

    /// Await the next interaction event for the current render.
    ///
    /// Resolves `None` when a newer request supersedes the wait. Only one
    /// waiter is armed per instance; arming a new one resolves the previous
    /// with `None`.
    pub async fn next_event(
        &self,
        instance_key: &str,
    ) -> Result<Option<InteractionEvent>, BridgeError> {
        let instance = self
            .instance(instance_key)
            .await
            .ok_or_else(|| BridgeError::UnknownInstance(instance_key.to_string()))?;

        let receiver = {
            let mut inner = instance.inner.lock().await;
            if let Some(event) = inner.event.take() {
                return Ok(Some(event));
            }
            let (tx, rx) = oneshot::channel();
            if let Some(previous) = inner.responder.replace(tx) {
                let _ = previous.send(None);
            }
            rx
        };

        // a dropped sender means the instance was torn down mid-wait
        Ok(receiver.await.unwrap_or(None))
    }

    /// Consume the pending interaction event, if any, without waiting.
    /// Each event is observable at most once.
    pub async fn take_event(
        &self,
        instance_key: &str,
    ) -> Result<Option<InteractionEvent>, BridgeError> {
        let instance = self
            .instance(instance_key)
            .await
            .ok_or_else(|| BridgeError::UnknownInstance(instance_key.to_string()))?;
        let mut inner = instance.inner.lock().await;
        Ok(inner.event.take())
    }

    /// Register a streaming event handler for this instance
    pub async fn subscribe(
        &self,
        instance_key: &str,
    ) -> Result<mpsc::Receiver<InteractionEvent>, BridgeError> {
        let instance = self
            .instance(instance_key)
            .await
            .ok_or_else(|| BridgeError::UnknownInstance(instance_key.to_string()))?;
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        instance.inner.lock().await.subscribers.push(tx);
        Ok(rx)
    }

    /// The transport connection for this key dropped. The instance returns
    /// to `AwaitingReady`; the last delivered request is queued so the next
    /// `ready` replays it.
    pub async fn on_disconnect(&self, instance_key: &str) {
        let Some(instance) = self.instance(instance_key).await else {
            return;
        };
        let mut inner = instance.inner.lock().await;
        info!("instance {}: viewer disconnected", instance_key);
        inner.phase = Phase::AwaitingReady;
        if inner.pending.is_none() {
            inner.pending = inner.last_delivered.clone();
        }
        instance.publish(&inner);
    }

    /// Host-driven teardown of one instance
    pub async fn remove(&self, instance_key: &str) -> bool {
        let removed = self.instances.write().await.remove(instance_key);
        match removed {
            Some(instance) => {
                let mut inner = instance.inner.lock().await;
                inner.supersede();
                info!("instance {} removed", instance_key);
                true
            }
            None => false,
        }
    }
}
