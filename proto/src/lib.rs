//! Wire protocol shared by the signaling server and the negotiation client.
//!
//! Every message crossing the WebSocket boundary is a JSON object tagged by
//! event name. This crate is the single place that translates those
//! string-keyed wire events into typed Rust values, so neither the server
//! nor the client ever has to touch an untyped payload.

use derive_more::{Display, From};
use medea_macro::dispatchable;
use serde::{Deserialize, Serialize};

/// Identifier of a room, opaque to the core, client-generated.
#[derive(
    Clone, Debug, Display, Eq, From, Hash, PartialEq, Serialize, Deserialize,
)]
pub struct RoomId(pub String);

/// Identifier of a user, opaque to the core, client-generated and stable
/// across reconnects.
#[derive(
    Clone,
    Debug,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialOrd,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct UserId(pub String);

/// Identifier of a transport session, server-assigned, changes on every
/// reconnect.
#[derive(
    Clone, Debug, Display, Eq, From, Hash, PartialEq, Serialize, Deserialize,
)]
pub struct SocketId(pub String);

/// Identifier of a chat message, opaque to the core, client-generated.
#[derive(
    Clone, Debug, Display, Eq, From, Hash, PartialEq, Serialize, Deserialize,
)]
pub struct MessageId(pub String);

/// A member of a room, as broadcast to other members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub socket_id: SocketId,
    pub nickname: String,
}

/// Opaque SDP/ICE signaling payload. The router never inspects its
/// contents, it only forwards it.
pub type SignalPayload = serde_json::Value;

/// Event sent from a `Client` to the `Media Server` over the transport.
#[dispatchable]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Command {
    /// Client requests to join `roomId` as `userId`, displaying `nickname`.
    #[serde(rename = "join-room")]
    JoinRoom {
        room_id: RoomId,
        user_id: UserId,
        nickname: String,
    },

    /// Client requests to leave `roomId`.
    #[serde(rename = "leave-room")]
    LeaveRoom { room_id: RoomId, user_id: UserId },

    /// Client requests the current member list of `roomId`.
    #[serde(rename = "request-participants")]
    RequestParticipants { room_id: RoomId },

    /// Client forwards an opaque signaling payload to another member.
    #[serde(rename = "signal")]
    Signal {
        to: UserId,
        from: UserId,
        signal: SignalPayload,
    },

    /// Client sends a chat message to be relayed to the rest of the room.
    #[serde(rename = "chat-message")]
    ChatMessage {
        room_id: RoomId,
        id: MessageId,
        sender_id: UserId,
        sender_nickname: String,
        content: String,
        timestamp: i64,
    },
}

/// Event sent from the `Media Server` to a `Client` over the transport.
#[dispatchable]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    /// Delivered to the requester alone: the full current member list of the
    /// room they just joined or asked about. Includes the requester itself
    /// on a fresh `join-room`; see the Design Notes for why this is
    /// intentional rather than corrected.
    #[serde(rename = "existing-participants")]
    ExistingParticipants { participants: Vec<MemberInfo> },

    /// Broadcast to the room (excluding the joiner) when a new member joins.
    #[serde(rename = "userJoined")]
    UserJoined(MemberInfo),

    /// Broadcast to the room (excluding the joiner) when a member rejoins
    /// under a new socket.
    #[serde(rename = "userRejoined")]
    UserRejoined(MemberInfo),

    /// Broadcast to the room (excluding the leaver) when a member leaves or
    /// disconnects.
    #[serde(rename = "userLeft")]
    UserLeft { user_id: UserId },

    /// Broadcast to the whole room whenever its member count changes.
    #[serde(rename = "participant-count")]
    ParticipantCount(usize),

    /// Delivered to the target socket only: an opaque signaling payload
    /// forwarded from another member.
    #[serde(rename = "signal")]
    Signal { from: UserId, signal: SignalPayload },

    /// Broadcast to the room (excluding the sender): a relayed chat message.
    #[serde(rename = "receiveMessage")]
    ReceiveMessage {
        id: MessageId,
        sender_id: UserId,
        sender_nickname: String,
        content: String,
        timestamp: i64,
    },
}

/// Message from `Client` to `Media Server`: either a heartbeat `pong` or a
/// [`Command`].
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMsg {
    /// Answers a previously received [`ServerMsg::Ping`].
    Pong(u64),
    /// Wraps a [`Command`].
    Command(Command),
}

/// Message from `Media Server` to `Client`: either a heartbeat `ping` or an
/// [`Event`].
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMsg {
    /// Sent periodically to probe the client's aliveness.
    Ping(u64),
    /// Wraps an [`Event`].
    Event(Event),
}

impl Serialize for ClientMsg {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        match self {
            Self::Pong(n) => {
                let mut s = serializer.serialize_struct("pong", 1)?;
                s.serialize_field("pong", n)?;
                s.end()
            }
            Self::Command(command) => command.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ClientMsg {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let value = serde_json::Value::deserialize(deserializer)?;
        let map = value.as_object().ok_or_else(|| {
            D::Error::custom(format!(
                "unable to deserialize ClientMsg [{:?}]",
                &value
            ))
        })?;

        if let Some(pong) = map.get("pong") {
            let n = pong.as_u64().ok_or_else(|| {
                D::Error::custom("ClientMsg::Pong must carry a u64")
            })?;
            Ok(Self::Pong(n))
        } else {
            serde_json::from_value::<Command>(value)
                .map(Self::Command)
                .map_err(|e| {
                    D::Error::custom(format!(
                        "unable to deserialize ClientMsg::Command: {}",
                        e
                    ))
                })
        }
    }
}

impl Serialize for ServerMsg {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        match self {
            Self::Ping(n) => {
                let mut s = serializer.serialize_struct("ping", 1)?;
                s.serialize_field("ping", n)?;
                s.end()
            }
            Self::Event(event) => event.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ServerMsg {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let value = serde_json::Value::deserialize(deserializer)?;
        let map = value.as_object().ok_or_else(|| {
            D::Error::custom(format!(
                "unable to deserialize ServerMsg [{:?}]",
                &value
            ))
        })?;

        if let Some(ping) = map.get("ping") {
            let n = ping.as_u64().ok_or_else(|| {
                D::Error::custom("ServerMsg::Ping must carry a u64")
            })?;
            Ok(Self::Ping(n))
        } else {
            serde_json::from_value::<Event>(value)
                .map(Self::Event)
                .map_err(|e| {
                    D::Error::custom(format!(
                        "unable to deserialize ServerMsg::Event: {}",
                        e
                    ))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_round_trips() {
        let cmd = ClientMsg::Command(Command::JoinRoom {
            room_id: RoomId("R".into()),
            user_id: UserId("u1".into()),
            nickname: "A".into(),
        });
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(serde_json::from_str::<ClientMsg>(&json).unwrap(), cmd);
    }

    #[test]
    fn pong_serializes_as_bare_field() {
        let pong = ClientMsg::Pong(5);
        assert_eq!("{\"pong\":5}", serde_json::to_string(&pong).unwrap());
    }

    #[test]
    fn ping_serializes_as_bare_field() {
        let ping = ServerMsg::Ping(15);
        assert_eq!("{\"ping\":15}", serde_json::to_string(&ping).unwrap());
    }

    #[test]
    fn existing_participants_event_tag() {
        let event = ServerMsg::Event(Event::ExistingParticipants {
            participants: vec![MemberInfo {
                user_id: UserId("u1".into()),
                socket_id: SocketId("s1".into()),
                nickname: "A".into(),
            }],
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "existing-participants");
    }

    #[test]
    fn signal_payload_is_forwarded_opaquely() {
        let payload = serde_json::json!({"type": "offer", "sdp": "X"});
        let cmd = Command::Signal {
            to: UserId("u1".into()),
            from: UserId("u2".into()),
            signal: payload.clone(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["data"]["signal"], payload);
    }
}
