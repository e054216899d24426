//! Payload encoding for the host/viewer boundary
//!
//! This module provides:
//! - Host-side request types (`VolumePayload`, `OverlaySpec`, `ViewerRequest`)
//! - The transport-safe representation sent across the bridge
//!   (`TransportVolume`, `TransportOverlay`, `EncodedRequest`)
//! - Pre-transport validation (`ValidationError`)

mod encoder;
mod types;

pub use encoder::{decode, encode, encode_overlay, encode_request};
pub use types::{
    DEFAULT_HEIGHT, DecodeError, EncodedRequest, OverlaySpec, TransportOverlay, TransportVolume,
    ValidationError, ViewerRequest, VolumePayload,
};
