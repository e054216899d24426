//! Converts viewer events into host-consumable interaction events

use crate::protocol::{InteractionEvent, ViewerMessage};
use tracing::debug;

/// Relay one viewer message.
///
/// Only `voxel_click` produces an event; every other message type returns
/// `None` so the viewer can ship event types older hosts do not consume.
/// Voxel and mm triples pass through verbatim from the viewer's own
/// computation.
pub fn relay(message: &ViewerMessage) -> Option<InteractionEvent> {
    match message {
        ViewerMessage::VoxelClick(click) => Some(InteractionEvent::VoxelClick(click.clone())),
        _ => None,
    }
}

/// Relay a raw inbound frame. Frames that do not parse as a known viewer
/// message are ignored, not errors.
pub fn relay_raw(text: &str) -> Option<InteractionEvent> {
    match serde_json::from_str::<ViewerMessage>(text) {
        Ok(message) => relay(&message),
        Err(e) => {
            debug!("ignoring unrecognized viewer event: {}", e);
            None
        }
    }
}
