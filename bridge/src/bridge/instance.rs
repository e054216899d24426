//! Per-instance initialization protocol state

use crate::payload::EncodedRequest;
use crate::protocol::{HostMessage, ImageBody, InteractionEvent, SettingsBody};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot, watch};

/// Initialization protocol phase.
///
/// `Uninitialized → AwaitingReady → Initializing → Ready →
/// (Reinitializing → Ready)*`. There is no terminal phase; an instance
/// persists until the host removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Embed created, not yet signaled
    Uninitialized,
    /// Waiting for the viewer runtime to emit `ready`
    AwaitingReady,
    /// First load sequence in flight
    Initializing,
    /// Viewer reflects the last delivered request
    Ready,
    /// Replaying the load sequence for a newer request
    Reinitializing,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Uninitialized => "uninitialized",
            Phase::AwaitingReady => "awaiting_ready",
            Phase::Initializing => "initializing",
            Phase::Ready => "ready",
            Phase::Reinitializing => "reinitializing",
        }
    }
}

/// Snapshot of an instance's protocol progress, published on a watch channel
#[derive(Debug, Clone, Copy)]
pub struct InstanceStatus {
    pub phase: Phase,
    /// Newest request accepted for this instance
    pub latest_generation: u64,
    /// Request the viewer currently reflects (0 = nothing delivered yet)
    pub loaded_generation: u64,
}

/// One logical viewer embedding.
///
/// All mutation happens under the per-instance mutex; holding it across the
/// load sequence is what keeps steps strictly ordered and never interleaved
/// with another request for the same key. Instances share no mutable state,
/// so separate keys initialize concurrently.
pub struct Instance {
    pub key: String,
    pub(crate) inner: Mutex<InstanceInner>,
    status_tx: watch::Sender<InstanceStatus>,
}

pub(crate) struct InstanceInner {
    pub phase: Phase,
    pub latest_generation: u64,
    pub loaded_generation: u64,
    /// Most recent request received before `ready`; an older buffered
    /// request is discarded, never merged
    pub pending: Option<EncodedRequest>,
    /// Last request actually delivered, kept for replay when the viewer
    /// runtime restarts
    pub last_delivered: Option<EncodedRequest>,
    /// Interaction event awaiting consumption (at most one)
    pub event: Option<InteractionEvent>,
    /// In-flight request/response waiter; resolved with `None` when a newer
    /// request supersedes it
    pub responder: Option<oneshot::Sender<Option<InteractionEvent>>>,
    /// Streaming event subscribers
    pub subscribers: Vec<mpsc::Sender<InteractionEvent>>,
}

impl Instance {
    pub fn new(key: impl Into<String>) -> Arc<Self> {
        let initial = InstanceStatus {
            phase: Phase::Uninitialized,
            latest_generation: 0,
            loaded_generation: 0,
        };
        let (status_tx, _) = watch::channel(initial);
        Arc::new(Self {
            key: key.into(),
            inner: Mutex::new(InstanceInner {
                phase: Phase::Uninitialized,
                latest_generation: 0,
                loaded_generation: 0,
                pending: None,
                last_delivered: None,
                event: None,
                responder: None,
                subscribers: Vec::new(),
            }),
            status_tx,
        })
    }

    pub fn subscribe_status(&self) -> watch::Receiver<InstanceStatus> {
        self.status_tx.subscribe()
    }

    pub fn current_status(&self) -> InstanceStatus {
        *self.status_tx.borrow()
    }

    /// Publish the current protocol progress to status watchers
    pub(crate) fn publish(&self, inner: &InstanceInner) {
        self.status_tx.send_replace(inner.status());
    }
}

impl InstanceInner {
    pub fn status(&self) -> InstanceStatus {
        InstanceStatus {
            phase: self.phase,
            latest_generation: self.latest_generation,
            loaded_generation: self.loaded_generation,
        }
    }

    /// A newer request replaces whatever response was in flight: the waiter
    /// resolves with `None` and any unconsumed event is cleared so stale
    /// click data never appears against a different volume.
    pub fn supersede(&mut self) {
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(None);
        }
        self.event = None;
    }

    /// Hand an event to whoever is listening: the in-flight waiter first,
    /// then streaming subscribers, otherwise the single-slot buffer (newest
    /// unconsumed event wins).
    pub fn deliver_event(&mut self, event: InteractionEvent) {
        let event = match self.responder.take() {
            Some(responder) => match responder.send(Some(event)) {
                Ok(()) => return,
                // waiter went away; fall through to the other paths
                Err(returned) => match returned {
                    Some(event) => event,
                    None => return,
                },
            },
            None => event,
        };

        self.subscribers.retain(|subscriber| !subscriber.is_closed());
        if !self.subscribers.is_empty() {
            for subscriber in &self.subscribers {
                let _ = subscriber.try_send(event.clone());
            }
            return;
        }

        self.event = Some(event);
    }
}

/// The strictly ordered load sequence for one request.
///
/// Settings go first so initial rendering parameters apply from the first
/// frame, then the canvas layer count, then the primary volume (skipped on
/// the empty marker), then each overlay in stacking order.
pub fn load_sequence(request: &EncodedRequest) -> Vec<HostMessage> {
    let mut messages = Vec::with_capacity(2 + request.layer_count() as usize);

    messages.push(HostMessage::InitSettings(SettingsBody::new(
        request.settings,
        request.view_mode,
    )));
    messages.push(HostMessage::InitCanvas {
        n: request.layer_count(),
    });

    if !request.volume.is_empty_marker() {
        messages.push(HostMessage::AddImage(ImageBody {
            data: request.volume.data.clone(),
            uri: request.volume.uri.clone(),
            colormap: None,
            opacity: None,
        }));
    }

    for overlay in &request.overlays {
        messages.push(HostMessage::AddImage(ImageBody {
            data: overlay.data.clone(),
            uri: overlay.uri.clone(),
            colormap: Some(overlay.colormap.clone()),
            opacity: Some(overlay.opacity),
        }));
    }

    messages
}
