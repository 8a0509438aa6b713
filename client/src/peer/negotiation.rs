//! Negotiation State Machine: Perfect Negotiation, one task per remote peer.
//!
//! Every [`RTCPeerConnection`] is paired with exactly one task that owns
//! `making_offer` and `pending_ice` for the lifetime of the peer; the
//! callbacks registered on the connection (`on_negotiation_needed`,
//! `on_ice_candidate`, `on_ice_connection_state_change`) only ever push a
//! [`PeerEvent`] into this task's channel, never touch that state
//! directly. This is the literal shape spec.md §9's Design Notes call for:
//! "one task per peer consuming a channel of inbound events ... with its
//! internal fields owned by that task alone."

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use signal_proto::{Command, UserId};
use tokio::sync::mpsc;
use webrtc::{
    ice_transport::{ice_candidate::RTCIceCandidateInit, ice_connection_state::RTCIceConnectionState},
    peer_connection::{
        sdp::session_description::RTCSessionDescription,
        signaling_state::RTCSignalingState,
        RTCPeerConnection,
    },
};

use crate::error::PeerError;

/// Inbound events a peer's negotiation task consumes, in order.
#[derive(Debug)]
pub enum PeerEvent {
    /// Fired by the RTC engine when local tracks change.
    NegotiationNeeded,
    RemoteOffer(String),
    RemoteAnswer(String),
    RemoteIceCandidate(RTCIceCandidateInit),
    IceStateChanged(RTCIceConnectionState),
    /// The peer is being torn down; abort any in-flight work.
    Disconnect,
}

/// Shared context a peer's negotiation task needs. `removed` is flipped by
/// [`crate::peer::table::PeerTable`] the instant the peer is evicted, so
/// any scheduled continuation (a debounce sleep, an ICE-restart attempt)
/// re-verifies the peer is still live before touching it, per spec.md's
/// "Reconnect timers" design note.
pub struct PeerTaskCtx {
    pub self_user_id: UserId,
    pub remote_user_id: UserId,
    pub polite: bool,
    pub pc: Arc<RTCPeerConnection>,
    pub outbox: mpsc::UnboundedSender<Command>,
    pub removed: Arc<AtomicBool>,
}

/// Debounce + per-peer negotiation loop. Runs until the event channel
/// closes or a [`PeerEvent::Disconnect`] is received.
pub async fn run(
    ctx: PeerTaskCtx,
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
    debounce: std::time::Duration,
) {
    let mut making_offer = false;
    let mut pending_ice: Vec<RTCIceCandidateInit> = Vec::new();

    while let Some(event) = events.recv().await {
        if ctx.removed.load(Ordering::SeqCst) {
            break;
        }

        match event {
            PeerEvent::NegotiationNeeded => {
                if making_offer {
                    continue;
                }
                tokio::time::sleep(debounce).await;
                if ctx.removed.load(Ordering::SeqCst) {
                    break;
                }
                if ctx.pc.signaling_state() != RTCSignalingState::Stable {
                    continue;
                }
                making_offer = true;
                if let Err(e) = make_and_send_offer(&ctx, false).await {
                    slog_scope::debug!(
                        "offer creation aborted"; "peer" => ctx.remote_user_id.to_string(), "error" => e.to_string(),
                    );
                }
                making_offer = false;
            }

            PeerEvent::RemoteOffer(sdp) => {
                let collision =
                    making_offer || ctx.pc.signaling_state() != RTCSignalingState::Stable;

                if collision && !ctx.polite {
                    slog_scope::debug!(
                        "ignoring colliding offer"; "peer" => ctx.remote_user_id.to_string(),
                    );
                    if !making_offer {
                        making_offer = true;
                        if let Err(e) = make_and_send_offer(&ctx, false).await {
                            slog_scope::debug!(
                                "offer creation aborted"; "peer" => ctx.remote_user_id.to_string(), "error" => e.to_string(),
                            );
                        }
                        making_offer = false;
                    }
                    continue;
                }

                if collision && ctx.polite {
                    if let Ok(rollback) = RTCSessionDescription::rollback() {
                        let _ = ctx.pc.set_local_description(rollback).await;
                    }
                }

                let offer = match RTCSessionDescription::offer(sdp) {
                    Ok(o) => o,
                    Err(e) => {
                        slog_scope::warn!("malformed remote offer"; "error" => e.to_string());
                        continue;
                    }
                };
                if let Err(e) = ctx.pc.set_remote_description(offer).await {
                    slog_scope::debug!("failed to apply remote offer"; "error" => e.to_string());
                    continue;
                }

                drain_pending_ice(&ctx.pc, &mut pending_ice).await;

                match ctx.pc.create_answer(None).await {
                    Ok(answer) => {
                        if ctx.pc.set_local_description(answer.clone()).await.is_ok() {
                            send_signal(
                                &ctx,
                                serde_json::json!({"type": "answer", "sdp": answer.sdp}),
                            );
                        }
                    }
                    Err(e) => slog_scope::debug!("failed to create answer"; "error" => e.to_string()),
                }
            }

            PeerEvent::RemoteAnswer(sdp) => {
                if ctx.pc.signaling_state() != RTCSignalingState::HaveLocalOffer {
                    continue;
                }
                let answer = match RTCSessionDescription::answer(sdp) {
                    Ok(a) => a,
                    Err(e) => {
                        slog_scope::warn!("malformed remote answer"; "error" => e.to_string());
                        continue;
                    }
                };
                if ctx.pc.set_remote_description(answer).await.is_ok() {
                    drain_pending_ice(&ctx.pc, &mut pending_ice).await;
                }
                making_offer = false;
            }

            PeerEvent::RemoteIceCandidate(candidate) => {
                if ctx.pc.remote_description().await.is_none() {
                    pending_ice.push(candidate);
                } else if let Err(e) = ctx.pc.add_ice_candidate(candidate).await {
                    slog_scope::debug!("failed to add ice candidate"; "error" => e.to_string());
                }
            }

            PeerEvent::IceStateChanged(state) => {
                if state == RTCIceConnectionState::Failed && !making_offer {
                    making_offer = true;
                    if let Err(e) = make_and_send_offer(&ctx, true).await {
                        slog_scope::debug!(
                            "ice restart offer aborted"; "peer" => ctx.remote_user_id.to_string(), "error" => e.to_string(),
                        );
                    }
                    making_offer = false;
                }
            }

            PeerEvent::Disconnect => break,
        }
    }
}

async fn make_and_send_offer(
    ctx: &PeerTaskCtx,
    ice_restart: bool,
) -> Result<(), tracerr::Traced<PeerError>> {
    let opts = ice_restart.then(|| webrtc::peer_connection::offer_answer_options::RTCOfferOptions {
        ice_restart: true,
        ..Default::default()
    });

    let offer = ctx
        .pc
        .create_offer(opts)
        .await
        .map_err(|e| tracerr::new!(PeerError::Webrtc(e.to_string())))?;

    if ctx.pc.signaling_state() != RTCSignalingState::Stable {
        return Err(tracerr::new!(PeerError::SignalingStateChanged));
    }

    ctx.pc
        .set_local_description(offer.clone())
        .await
        .map_err(|e| tracerr::new!(PeerError::Webrtc(e.to_string())))?;

    send_signal(ctx, serde_json::json!({"type": "offer", "sdp": offer.sdp}));
    Ok(())
}

async fn drain_pending_ice(pc: &RTCPeerConnection, pending: &mut Vec<RTCIceCandidateInit>) {
    for candidate in pending.drain(..) {
        if let Err(e) = pc.add_ice_candidate(candidate).await {
            slog_scope::debug!("failed to add queued ice candidate"; "error" => e.to_string());
        }
    }
}

fn send_signal(ctx: &PeerTaskCtx, payload: serde_json::Value) {
    let _ = ctx.outbox.send(Command::Signal {
        to: ctx.remote_user_id.clone(),
        from: ctx.self_user_id.clone(),
        signal: payload,
    });
}

/// Determines polite/impolite role for a pair of users: the lexicographically
/// smaller `UserId` is polite. Symmetric and deterministic without
/// coordination, per spec.md §4.5.
#[must_use]
pub fn is_polite(self_user_id: &UserId, remote_user_id: &UserId) -> bool {
    self_user_id < remote_user_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polite_role_is_symmetric_and_deterministic() {
        let u1 = UserId("u1".into());
        let u2 = UserId("u2".into());
        assert!(is_polite(&u1, &u2));
        assert!(!is_polite(&u2, &u1));
    }
}
