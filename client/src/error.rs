//! Error kinds for the negotiation client.
//!
//! Per spec.md §7: nothing here is fatal to the core. These are traced with
//! [`tracerr`] so a log site can name where a failure originated without
//! the failure itself ever propagating to a caller that would otherwise
//! have to decide how to surface it — that's the session/UI layer's job,
//! outside this crate.

use derive_more::{Display, From};

pub type TracedResult<T, E> = Result<T, tracerr::Traced<E>>;

#[derive(Clone, Debug, Display, From)]
pub enum PeerError {
    #[display(fmt = "webrtc error: {}", _0)]
    Webrtc(String),

    #[display(fmt = "peer {} was removed during negotiation", _0)]
    PeerRemoved(String),

    #[display(fmt = "signaling state changed mid-negotiation")]
    SignalingStateChanged,
}

#[derive(Clone, Debug, Display, From)]
pub enum TransportError {
    #[display(fmt = "websocket error: {}", _0)]
    WebSocket(String),

    #[display(fmt = "malformed server message: {}", _0)]
    Malformed(String),

    #[display(fmt = "connection closed")]
    Closed,
}
