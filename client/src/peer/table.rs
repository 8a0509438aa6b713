//! Peer Connection Manager: owns every [`RTCPeerConnection`] this client
//! currently holds, bounds how many may exist at once, and garbage-collects
//! ones that have gone stale.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Instant,
};

use dashmap::DashMap;
use signal_proto::{Command, UserId};
use tokio::sync::{mpsc, Mutex};
use webrtc::{
    ice_transport::{ice_candidate::RTCIceCandidateInit, ice_connection_state::RTCIceConnectionState},
    peer_connection::{
        peer_connection_state::RTCPeerConnectionState, RTCPeerConnection,
    },
    rtp_transceiver::rtp_sender::RTCRtpSender,
    track::track_local::{track_local_static_sample::TrackLocalStaticSample, TrackLocal},
};

use crate::{
    config::Conf,
    error::{PeerError, TracedResult},
    peer::{
        connection,
        negotiation::{self, PeerEvent, PeerTaskCtx},
    },
};

struct PeerHandle {
    pc: Arc<RTCPeerConnection>,
    events: mpsc::UnboundedSender<PeerEvent>,
    removed: Arc<AtomicBool>,
    created_at: Instant,
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
}

/// Bounds concurrent connections at `MAX_PEER_CONNECTIONS`, evicting the
/// oldest peer to make room for a newly-requested one, and sweeps peers
/// whose ICE connection has sat in a non-connected state past
/// `stale_threshold` for longer than `cleanup_interval` allows between
/// sweeps.
pub struct PeerTable {
    conf: Arc<Conf>,
    self_user_id: UserId,
    outbox: mpsc::UnboundedSender<Command>,
    peers: DashMap<UserId, PeerHandle>,
    /// Peers a connection build is in flight for but not yet registered in
    /// `peers` — prevents a concurrent `initiate` racing the same remote
    /// user into two connections.
    pending: Mutex<HashSet<UserId>>,

    /// `PendingSet`, per spec.md §4.4/§9: remote users whose reconnection
    /// has been deferred (evicted for capacity, or removed by the
    /// disconnected/failed reconnect policy below) and is waiting on a
    /// `reconnect_delay` timer before `initiate` fires again. Drained and
    /// retried immediately by [`Self::swap_local_stream`].
    pending_retry: Mutex<HashSet<UserId>>,

    /// Self-reference handed to per-peer connection-state callbacks so a
    /// scheduled reconnect can call back into `initiate`/`remove` without
    /// the table owning its own strong `Arc`. Upgraded to a strong `Arc`
    /// right before use and dropped immediately after; a dead table (the
    /// room was torn down) makes the upgrade fail and the scheduled
    /// continuation a no-op, matching the "re-verify peer identity on
    /// execution" reconnect-timer design note.
    self_weak: Weak<Self>,
}

impl PeerTable {
    #[must_use]
    pub fn new(conf: Arc<Conf>, self_user_id: UserId, outbox: mpsc::UnboundedSender<Command>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            conf,
            self_user_id,
            outbox,
            peers: DashMap::new(),
            pending: Mutex::new(HashSet::new()),
            pending_retry: Mutex::new(HashSet::new()),
            self_weak: weak.clone(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    #[must_use]
    pub fn contains(&self, user_id: &UserId) -> bool {
        self.peers.contains_key(user_id)
    }

    /// Ensures a peer connection exists for `remote_user_id`, building one
    /// (evicting the oldest peer first if at `max_peer_connections`
    /// capacity) if it doesn't. Returns the existing or freshly-built
    /// connection's handle without triggering negotiation; negotiation is
    /// driven entirely by the `on_negotiation_needed` callback once local
    /// tracks are attached.
    pub async fn initiate(&self, remote_user_id: UserId) -> TracedResult<(), PeerError> {
        if self.peers.contains_key(&remote_user_id) {
            return Ok(());
        }

        {
            let mut pending = self.pending.lock().await;
            if !pending.insert(remote_user_id.clone()) {
                return Ok(());
            }
        }

        let result = self.build_peer(remote_user_id.clone()).await;

        self.pending.lock().await.remove(&remote_user_id);
        result
    }

    async fn build_peer(&self, remote_user_id: UserId) -> TracedResult<(), PeerError> {
        if self.peers.len() >= self.conf.max_peer_connections {
            self.evict_oldest().await;
        }

        let pc = connection::build(&self.conf.stun_servers)
            .await
            .map_err(|e| tracerr::new!(PeerError::Webrtc(e.to_string())))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let removed = Arc::new(AtomicBool::new(false));

        register_callbacks(
            &pc,
            tx.clone(),
            self.outbox.clone(),
            self.self_user_id.clone(),
            remote_user_id.clone(),
            self.self_weak.clone(),
            Arc::clone(&removed),
        );

        let ctx = PeerTaskCtx {
            self_user_id: self.self_user_id.clone(),
            remote_user_id: remote_user_id.clone(),
            polite: negotiation::is_polite(&self.self_user_id, &remote_user_id),
            pc: Arc::clone(&pc),
            outbox: self.outbox.clone(),
            removed: Arc::clone(&removed),
        };
        let debounce = self.conf.negotiation_debounce;
        tokio::spawn(negotiation::run(ctx, rx, debounce));

        self.peers.insert(
            remote_user_id,
            PeerHandle {
                pc,
                events: tx,
                removed,
                created_at: Instant::now(),
                senders: Mutex::new(Vec::new()),
            },
        );
        Ok(())
    }

    /// Oldest-by-`created_at` eviction, per spec.md §4.4: the displaced
    /// peer is placed in [`Self::pending_retry`] rather than simply
    /// dropped, so a later [`Self::swap_local_stream`] (or any other
    /// future retry trigger) can re-establish it.
    async fn evict_oldest(&self) {
        let oldest = self
            .peers
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());

        if let Some(user_id) = oldest {
            slog_scope::info!("evicting oldest peer connection to make room"; "peer" => user_id.to_string());
            self.remove_sync(&user_id);
            self.pending_retry.lock().await.insert(user_id);
        }
    }

    /// Forwards a decoded `signal` payload to the named peer's negotiation
    /// task, building the connection first if this is the first we've
    /// heard of that remote (it's the initiator of an incoming offer).
    pub async fn ingest_signal(
        &self,
        from: UserId,
        payload: serde_json::Value,
    ) -> TracedResult<(), PeerError> {
        if !self.peers.contains_key(&from) {
            self.initiate(from.clone()).await?;
        }

        let event = match payload.get("type").and_then(serde_json::Value::as_str) {
            Some("offer") => payload
                .get("sdp")
                .and_then(serde_json::Value::as_str)
                .map(|sdp| PeerEvent::RemoteOffer(sdp.to_string())),
            Some("answer") => payload
                .get("sdp")
                .and_then(serde_json::Value::as_str)
                .map(|sdp| PeerEvent::RemoteAnswer(sdp.to_string())),
            Some("ice") => serde_json::from_value::<RTCIceCandidateInit>(
                payload.get("candidate").cloned().unwrap_or(serde_json::Value::Null),
            )
            .ok()
            .map(PeerEvent::RemoteIceCandidate),
            _ => None,
        };

        match (event, self.peers.get(&from)) {
            (Some(event), Some(handle)) => {
                let _ = handle.events.send(event);
                Ok(())
            }
            (None, _) => Err(tracerr::new!(PeerError::Webrtc(
                "malformed signal payload".to_string()
            ))),
            (_, None) => Err(tracerr::new!(PeerError::PeerRemoved(from.to_string()))),
        }
    }

    /// Tears down and rebuilds every peer's outbound track, debounced by
    /// `stream_swap_delay` so a rapid sequence of device switches coalesces
    /// into a single renegotiation per peer. Per spec.md §4.4, connections
    /// currently deferred in the `PendingSet` are retried once the swap
    /// settles, alongside the peers that were already connected.
    pub async fn swap_local_stream(&self, track: Arc<TrackLocalStaticSample>) {
        tokio::time::sleep(self.conf.stream_swap_delay).await;

        for entry in self.peers.iter() {
            let handle = entry.value();
            if handle.removed.load(Ordering::SeqCst) {
                continue;
            }
            let mut senders = handle.senders.lock().await;
            for sender in senders.drain(..) {
                let _ = handle.pc.remove_track(&sender).await;
            }
            if let Ok(sender) = handle
                .pc
                .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
                .await
            {
                senders.push(sender);
            }
        }

        let deferred: Vec<UserId> = self.pending_retry.lock().await.drain().collect();
        for user_id in deferred {
            if let Err(e) = self.initiate(user_id.clone()).await {
                slog_scope::warn!(
                    "failed to retry pending peer after stream swap"; "peer" => user_id.to_string(), "error" => e.to_string(),
                );
            }
        }
    }

    /// Removes a peer, dropping its `pending_ice` atomically with the task
    /// that owns it: flipping `removed` first guarantees the task observes
    /// it before processing anything queued after this call.
    pub async fn remove(&self, user_id: &UserId) {
        self.remove_sync(user_id);
    }

    fn remove_sync(&self, user_id: &UserId) {
        if let Some((_, handle)) = self.peers.remove(user_id) {
            handle.removed.store(true, Ordering::SeqCst);
            let _ = handle.events.send(PeerEvent::Disconnect);
            let pc = Arc::clone(&handle.pc);
            tokio::spawn(async move {
                let _ = pc.close().await;
            });
        }
    }

    pub async fn close_all(&self) {
        let ids: Vec<UserId> = self.peers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.remove(&id).await;
        }
    }

    /// Sweeps peers whose ICE connection has been `disconnected` or
    /// `failed` for longer than `stale_threshold`. Intended to run on a
    /// `cleanup_interval` tick owned by the room orchestrator.
    pub async fn sweep_stale(&self) {
        let stale: Vec<UserId> = self
            .peers
            .iter()
            .filter(|entry| {
                let state = entry.value().pc.ice_connection_state();
                matches!(
                    state,
                    RTCIceConnectionState::Disconnected
                        | RTCIceConnectionState::Failed
                        | RTCIceConnectionState::Closed
                ) && entry.value().created_at.elapsed() >= self.conf.stale_threshold
            })
            .map(|entry| entry.key().clone())
            .collect();

        for id in stale {
            slog_scope::info!("sweeping stale peer connection"; "peer" => id.to_string());
            self.remove(&id).await;
        }
    }

    fn connection_state(&self, user_id: &UserId) -> Option<RTCPeerConnectionState> {
        self.peers.get(user_id).map(|h| h.pc.connection_state())
    }

    /// Implements the per-peer reconnect policy of spec.md §4.4, scheduled
    /// from [`RTCPeerConnection::on_peer_connection_state_change`]:
    /// `disconnected` waits `disconnect_grace` and re-checks before acting;
    /// `failed` acts immediately. Both remove the peer, park it in the
    /// `PendingSet`, then fire `initiate` again after `reconnect_delay`.
    /// `removed` is re-checked before every step so a peer that was torn
    /// down for an unrelated reason (capacity eviction, `leave-room`,
    /// `swap_local_stream`) in the meantime is left alone.
    async fn handle_connection_state_change(
        self: Arc<Self>,
        user_id: UserId,
        state: RTCPeerConnectionState,
        removed: Arc<AtomicBool>,
    ) {
        match state {
            RTCPeerConnectionState::Disconnected => {
                tokio::time::sleep(self.conf.disconnect_grace).await;
                if removed.load(Ordering::SeqCst) {
                    return;
                }
                let still_down = matches!(
                    self.connection_state(&user_id),
                    Some(RTCPeerConnectionState::Disconnected)
                        | Some(RTCPeerConnectionState::Failed)
                );
                if !still_down {
                    return;
                }
                self.remove_and_schedule_retry(user_id).await;
            }
            RTCPeerConnectionState::Failed => {
                if removed.load(Ordering::SeqCst) {
                    return;
                }
                self.remove_and_schedule_retry(user_id).await;
            }
            _ => {}
        }
    }

    async fn remove_and_schedule_retry(self: Arc<Self>, user_id: UserId) {
        self.remove(&user_id).await;
        self.pending_retry.lock().await.insert(user_id.clone());

        tokio::time::sleep(self.conf.reconnect_delay).await;
        if self.pending_retry.lock().await.remove(&user_id) {
            if let Err(e) = self.initiate(user_id.clone()).await {
                slog_scope::warn!(
                    "reconnect attempt failed"; "peer" => user_id.to_string(), "error" => e.to_string(),
                );
            }
        }
    }
}

fn register_callbacks(
    pc: &Arc<RTCPeerConnection>,
    tx: mpsc::UnboundedSender<PeerEvent>,
    outbox: mpsc::UnboundedSender<Command>,
    self_user_id: UserId,
    remote_user_id: UserId,
    table: Weak<PeerTable>,
    removed: Arc<AtomicBool>,
) {
    let negotiation_tx = tx.clone();
    pc.on_negotiation_needed(Box::new(move || {
        let tx = negotiation_tx.clone();
        Box::pin(async move {
            let _ = tx.send(PeerEvent::NegotiationNeeded);
        })
    }));

    // A locally-gathered candidate is signaled out to the remote peer
    // directly; it never re-enters this peer's own event loop.
    let ice_outbox = outbox;
    let ice_self = self_user_id;
    let ice_remote = remote_user_id.clone();
    pc.on_ice_candidate(Box::new(move |candidate| {
        let outbox = ice_outbox.clone();
        let from = ice_self.clone();
        let to = ice_remote.clone();
        Box::pin(async move {
            if let Some(candidate) = candidate {
                if let Ok(init) = candidate.to_json() {
                    let _ = outbox.send(Command::Signal {
                        to,
                        from,
                        signal: serde_json::json!({"type": "ice", "candidate": init}),
                    });
                }
            }
        })
    }));

    let ice_state_tx = tx;
    pc.on_ice_connection_state_change(Box::new(move |state| {
        let tx = ice_state_tx.clone();
        Box::pin(async move {
            let _ = tx.send(PeerEvent::IceStateChanged(state));
        })
    }));

    // Drives spec.md §4.4's reconnect policy: `disconnected`/`failed`
    // transitions on the overall connection (not the ICE sub-state the
    // negotiation task watches for restarts) schedule a remove-and-retry
    // cycle owned by the table, not the per-peer negotiation task.
    pc.on_peer_connection_state_change(Box::new(move |state| {
        let table = table.clone();
        let remote_user_id = remote_user_id.clone();
        let removed = Arc::clone(&removed);
        Box::pin(async move {
            if let Some(table) = table.upgrade() {
                table
                    .handle_connection_state_change(remote_user_id, state, removed)
                    .await;
            }
        })
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conf() -> Arc<Conf> {
        Arc::new(Conf::default())
    }

    #[tokio::test]
    async fn empty_table_reports_no_peers() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let table = PeerTable::new(test_conf(), UserId("self".into()), tx);
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }
}
