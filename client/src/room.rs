//! Top-level client orchestrator: wires the signaling transport to the
//! peer table, translating server events into peer-table operations and
//! peer-table signals into outbound commands. This is the seam an
//! application (the session/UI layer, out of scope here) drives.

use std::sync::Arc;

use signal_proto::{Command, Event, MemberInfo, RoomId, UserId};
use tokio::sync::mpsc;

use crate::{config::Conf, peer::PeerTable};

/// A joined room: owns the peer table and the channel used to push
/// commands out to the transport.
pub struct Room {
    room_id: RoomId,
    self_user_id: UserId,
    nickname: String,
    peers: Arc<PeerTable>,
    outbox: mpsc::UnboundedSender<Command>,
}

impl Room {
    #[must_use]
    pub fn new(
        conf: Arc<Conf>,
        room_id: RoomId,
        self_user_id: UserId,
        nickname: String,
        outbox: mpsc::UnboundedSender<Command>,
    ) -> Self {
        let peers = PeerTable::new(conf, self_user_id.clone(), outbox.clone());

        let room = Self {
            room_id,
            self_user_id,
            nickname,
            peers,
            outbox,
        };
        room.rejoin();
        room
    }

    /// (Re-)sends `join-room` under the stored nickname. Called once at
    /// construction and again every time the transport reports a fresh
    /// connection, since the registry has no memory of a room across a
    /// dropped socket.
    pub fn rejoin(&self) {
        let _ = self.outbox.send(Command::JoinRoom {
            room_id: self.room_id.clone(),
            user_id: self.self_user_id.clone(),
            nickname: self.nickname.clone(),
        });
    }

    #[must_use]
    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    /// Drives one inbound server [`Event`], the client-side counterpart of
    /// `registry.rs`'s fan-out on the server: membership events open or
    /// close peer connections, `signal` events feed the negotiation state
    /// machine, everything else is left to the application layer to
    /// observe (chat messages, participant counts).
    pub async fn handle_event(&self, event: Event) {
        match event {
            Event::ExistingParticipants { participants } => {
                for member in participants {
                    self.initiate_if_not_self(member).await;
                }
            }
            Event::UserJoined(member) | Event::UserRejoined(member) => {
                self.initiate_if_not_self(member).await;
            }
            Event::UserLeft { user_id } => {
                self.peers.remove(&user_id).await;
            }
            Event::Signal { from, signal } => {
                if let Err(e) = self.peers.ingest_signal(from, signal).await {
                    slog_scope::warn!("failed to ingest signal"; "error" => e.to_string());
                }
            }
            Event::ParticipantCount(_) | Event::ReceiveMessage { .. } => {}
        }
    }

    async fn initiate_if_not_self(&self, member: MemberInfo) {
        if member.user_id == self.self_user_id {
            return;
        }
        if let Err(e) = self.peers.initiate(member.user_id).await {
            slog_scope::warn!("failed to initiate peer connection"; "error" => e.to_string());
        }
    }

    pub fn request_participants(&self) {
        let _ = self.outbox.send(Command::RequestParticipants {
            room_id: self.room_id.clone(),
        });
    }

    pub fn send_chat_message(&self, id: signal_proto::MessageId, content: String, timestamp: i64) {
        let _ = self.outbox.send(Command::ChatMessage {
            room_id: self.room_id.clone(),
            id,
            sender_id: self.self_user_id.clone(),
            sender_nickname: self.nickname.clone(),
            content,
            timestamp,
        });
    }

    /// Runs the periodic stale-peer sweep forever, at `cleanup_interval`.
    /// Intended to be spawned as its own task alongside the transport's
    /// `run` loop.
    pub async fn run_cleanup_sweep(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.peers.sweep_stale().await;
        }
    }

    pub async fn leave(&self) {
        let _ = self.outbox.send(Command::LeaveRoom {
            room_id: self.room_id.clone(),
            user_id: self.self_user_id.clone(),
        });
        self.peers.close_all().await;
    }
}
