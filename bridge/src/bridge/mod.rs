//! Host/embedded-viewer bridge
//!
//! This module provides:
//! - `Transport` trait for abstracting the host/viewer boundary
//! - The per-instance initialization protocol state machine
//! - `Bridge` for keyed instance management and request/event exchange
//! - The event relay for inbound viewer messages

pub mod instance;
pub mod manager;
pub mod relay;
pub mod transport;

pub use instance::{Instance, InstanceStatus, Phase};
pub use manager::{Bridge, BridgeConfig, BridgeError, SendOutcome};
pub use relay::{relay, relay_raw};
pub use transport::{ChannelTransport, Transport, TransportError};
