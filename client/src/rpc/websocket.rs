//! WebSocket transport to the signaling server: connect/reconnect loop,
//! heartbeat watchdog, and `ClientMsg`/`ServerMsg` framing.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use signal_proto::{ClientMsg, Command, Event, ServerMsg};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{
    config::Conf,
    error::{TracedResult, TransportError},
    rpc::{backoff::ReconnectDelayer, heartbeat::Heartbeat},
};

/// What the transport reports back to the orchestrator, in addition to the
/// wire-level [`Event`]s: a fresh connection (initial or after a drop)
/// that the room must answer with a `join-room`, since the registry has
/// no memory of a room across a dropped socket.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Connected,
    Server(Event),
}

pub struct Transport {
    conf: Arc<Conf>,
}

impl Transport {
    #[must_use]
    pub fn new(conf: Arc<Conf>) -> Self {
        Self { conf }
    }

    /// Connects, and on any read/write failure or heartbeat timeout,
    /// reconnects after `reconnect_delay`. Runs until the process is torn
    /// down; never returns `Ok` on its own.
    pub async fn run(
        self,
        mut outbound_rx: mpsc::UnboundedReceiver<Command>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> TracedResult<(), TransportError> {
        let url = self
            .conf
            .server_url
            .clone()
            .ok_or_else(|| tracerr::new!(TransportError::Malformed("server_url not set".into())))?;

        let mut delayer = ReconnectDelayer::new(self.conf.reconnect_delay);

        loop {
            match connect_async(&url).await {
                Ok((ws_stream, _)) => {
                    slog_scope::info!("connected to signaling server"; "url" => url.clone());
                    delayer.reset();
                    let _ = events_tx.send(TransportEvent::Connected);
                    let (mut write, mut read) = ws_stream.split();
                    let mut heartbeat = Heartbeat::new(self.conf.ping_timeout);

                    loop {
                        tokio::select! {
                            incoming = read.next() => match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str::<ServerMsg>(&text) {
                                        Ok(ServerMsg::Ping(n)) => {
                                            heartbeat.record_ping();
                                            if let Ok(pong) = serde_json::to_string(&ClientMsg::Pong(n)) {
                                                if write.send(Message::Text(pong)).await.is_err() {
                                                    break;
                                                }
                                            }
                                        }
                                        Ok(ServerMsg::Event(event)) => {
                                            let _ = events_tx.send(TransportEvent::Server(event));
                                        }
                                        Err(e) => {
                                            slog_scope::warn!("malformed server message"; "error" => e.to_string());
                                        }
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Err(e)) => {
                                    slog_scope::warn!("websocket read error"; "error" => e.to_string());
                                    break;
                                }
                                _ => {}
                            },
                            Some(command) = outbound_rx.recv() => {
                                match serde_json::to_string(&ClientMsg::Command(command)) {
                                    Ok(json) => {
                                        if write.send(Message::Text(json)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => slog_scope::warn!("failed to encode command"; "error" => e.to_string()),
                                }
                            }
                            () = tokio::time::sleep(Duration::from_secs(5)) => {
                                if heartbeat.is_stale() {
                                    slog_scope::warn!("heartbeat timed out, reconnecting");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    slog_scope::warn!("failed to connect to signaling server"; "error" => e.to_string());
                }
            }

            delayer.wait().await;
        }
    }
}
