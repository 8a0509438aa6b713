//! Per-socket WebSocket session actor.
//!
//! One [`Session`] actor is spawned per accepted connection. It owns the
//! transport-level framing and heartbeat; every [`signal_proto::Command`] it
//! decodes is handed straight to the shared [`Registry`] and every
//! [`ServerEvent`] the registry routes back to this socket is serialized
//! onto the wire.

use std::time::Instant;

use actix::{Actor, ActorContext, AsyncContext, Handler, StreamHandler};
use actix_web_actors::ws;
use signal_proto::{ClientMsg, Command, ServerMsg, SocketId};

use crate::{
    config::HeartbeatConf,
    registry::{Registry, ServerEvent},
};

pub struct Session {
    id: SocketId,
    registry: std::sync::Arc<Registry>,
    heartbeat: HeartbeatConf,
    last_heartbeat: Instant,
}

impl Session {
    #[must_use]
    pub fn new(id: SocketId, registry: std::sync::Arc<Registry>, heartbeat: HeartbeatConf) -> Self {
        Self {
            id,
            registry,
            heartbeat,
            last_heartbeat: Instant::now(),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.heartbeat.ping_timeout;
        ctx.run_interval(self.heartbeat.ping_interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > timeout {
                slog_scope::info!("client heartbeat missed, dropping"; "socket" => act.id.to_string());
                let registry = std::sync::Arc::clone(&act.registry);
                let socket_id = act.id.clone();
                actix::spawn(async move {
                    registry.on_disconnect(&socket_id).await;
                });
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for Session {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);
        self.registry
            .register_socket(self.id.clone(), ctx.address().recipient());
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        let registry = std::sync::Arc::clone(&self.registry);
        let socket_id = self.id.clone();
        actix::spawn(async move {
            registry.on_disconnect(&socket_id).await;
        });
    }
}

impl Handler<ServerEvent> for Session {
    type Result = ();

    fn handle(&mut self, msg: ServerEvent, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(json) => ctx.text(json),
            Err(e) => slog_scope::error!("failed to encode ServerMsg"; "error" => e.to_string()),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for Session {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match item {
            Ok(msg) => msg,
            Err(e) => {
                slog_scope::warn!("websocket protocol error"; "error" => e.to_string());
                ctx.stop();
                return;
            }
        };

        match msg {
            ws::Message::Ping(bytes) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&bytes);
            }
            ws::Message::Pong(_) => {
                self.last_heartbeat = Instant::now();
            }
            ws::Message::Text(text) => self.handle_text(&text),
            ws::Message::Binary(_) => {
                slog_scope::warn!("dropping unexpected binary frame"; "socket" => self.id.to_string());
            }
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) | ws::Message::Nop => {}
        }
    }
}

impl Session {
    /// Decodes one text frame and, on success, dispatches it to the
    /// registry. Malformed frames and unknown commands are logged and
    /// dropped, never fatal, per the specification's Error Handling Design.
    fn handle_text(&mut self, text: &str) {
        let client_msg: ClientMsg = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                let err = tracerr::new!(crate::error::ProtocolError::Malformed(e.to_string()));
                slog_scope::warn!(
                    "dropping malformed client message";
                    "socket" => self.id.to_string(), "error" => err.to_string(),
                );
                return;
            }
        };

        let command = match client_msg {
            ClientMsg::Pong(_) => {
                self.last_heartbeat = Instant::now();
                return;
            }
            ClientMsg::Command(command) => command,
        };

        let registry = std::sync::Arc::clone(&self.registry);
        let socket_id = self.id.clone();
        actix::spawn(async move {
            dispatch(&registry, socket_id, command).await;
        });
    }
}

async fn dispatch(registry: &Registry, socket_id: SocketId, command: Command) {
    match command {
        Command::JoinRoom {
            room_id,
            user_id,
            nickname,
        } => {
            let participants = registry
                .join(room_id, user_id, nickname, socket_id.clone())
                .await;
            registry.route_existing_participants(&socket_id, participants);
        }
        Command::LeaveRoom { room_id, user_id } => {
            registry.leave(room_id, user_id, socket_id).await;
        }
        Command::RequestParticipants { room_id } => {
            let participants = registry.request_participants(&room_id).await;
            registry.route_existing_participants(&socket_id, participants);
        }
        Command::Signal { to, from, signal } => {
            registry.route_signal(to, from, signal);
        }
        Command::ChatMessage {
            room_id,
            id,
            sender_id,
            sender_nickname,
            content,
            timestamp,
        } => {
            registry
                .relay_chat(
                    room_id,
                    id,
                    sender_id,
                    sender_nickname,
                    content,
                    timestamp,
                    socket_id,
                )
                .await;
        }
    }
}
