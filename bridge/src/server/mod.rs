//! Reference deployment surface: one WebSocket per embedded viewer plus the
//! host-facing HTTP API the demo scripts drive.

pub mod routes;
pub mod websocket;

pub use routes::viewer_routes;
pub use websocket::{AppState, ws_handler};
