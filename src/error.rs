//! Error kinds for the parts of the server that can meaningfully fail.
//!
//! Per the specification's Error Handling Design: "Nothing in the core is
//! fatal." These types exist so every drop/log site has a named reason
//! attached to it, not so callers can retry — there is no retry path here.

use derive_more::Display;

/// Reason a raw WebSocket frame was logged and dropped instead of being
/// dispatched to the [`crate::registry::Registry`].
#[derive(Clone, Debug, Display)]
pub enum ProtocolError {
    #[display(fmt = "malformed client message: {}", _0)]
    Malformed(String),

    #[display(fmt = "unsupported frame kind")]
    UnsupportedFrame,
}

pub type Traced<E> = tracerr::Traced<E>;
