//! Signaling transport: reconnecting WebSocket client, heartbeat watchdog,
//! and reconnect delay policy.

pub mod backoff;
pub mod heartbeat;
pub mod websocket;

pub use websocket::{Transport, TransportEvent};
