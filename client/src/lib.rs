//! Native WebRTC perfect-negotiation client: the Peer Connection Manager,
//! Negotiation State Machine and Track Router that drive a mesh call
//! against the signaling server in this workspace's `signaler` crate.
//!
//! This crate is a library: it owns peer connections and the signaling
//! transport, but has no UI or media-capture surface of its own. An
//! application embeds it, supplies local tracks, and observes room events.

pub mod config;
pub mod error;
pub mod peer;
pub mod room;
pub mod rpc;

pub use config::Conf;
pub use room::Room;
pub use rpc::TransportEvent;
