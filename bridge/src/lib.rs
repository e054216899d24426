//! NiiVue Bridge Library
//!
//! Host-side bridge for embedded NiiVue volume viewers: payload encoding,
//! the per-instance initialization protocol, and the event relay, plus the
//! WebSocket/HTTP surface of the reference deployment.

pub mod bridge;
pub mod config;
pub mod payload;
pub mod protocol;
pub mod server;

mod test_utils;

// Re-export commonly used types
pub use bridge::{
    Bridge, BridgeConfig, BridgeError, ChannelTransport, InstanceStatus, Phase, SendOutcome,
    Transport, TransportError,
};
pub use payload::{OverlaySpec, ValidationError, ViewerRequest, VolumePayload};
pub use protocol::{
    HostMessage, InteractionEvent, ViewMode, ViewerMessage, ViewerSettings, VoxelClick,
};
pub use server::{AppState, viewer_routes, ws_handler};
