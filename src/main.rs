//! Entry point: wires up configuration, logging, the shared [`Registry`]
//! and the `actix-web` HTTP/WebSocket listener.

mod config;
mod error;
mod http;
mod logging;
mod registry;
mod session;

use std::sync::Arc;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use signal_proto::SocketId;
use uuid::Uuid;

use crate::{config::HeartbeatConf, registry::Registry};

async fn ws_route(
    req: HttpRequest,
    stream: web::Payload,
    registry: web::Data<Arc<Registry>>,
    heartbeat: web::Data<HeartbeatConf>,
) -> Result<HttpResponse, actix_web::Error> {
    let socket_id = SocketId(Uuid::new_v4().to_string());
    ws::start(
        session::Session::new(socket_id, Arc::clone(&registry), heartbeat.get_ref().clone()),
        &req,
        stream,
    )
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _log_guard = logging::init();

    let conf = config::Conf::parse().unwrap_or_else(|e| {
        slog_scope::warn!("falling back to default configuration"; "error" => e.to_string());
        config::Conf::default()
    });

    let registry = Arc::new(Registry::new());
    let bind_addr = conf.server.bind_addr();
    let heartbeat = conf.heartbeat.clone();

    slog_scope::info!("starting signaling server"; "bind_addr" => bind_addr.clone());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(Arc::clone(&registry)))
            .app_data(web::Data::new(heartbeat.clone()))
            .route("/ws", web::get().to(ws_route))
            .route("/api/rooms", web::get().to(http::list_rooms))
            .route("/api/rooms/{room_id}", web::get().to(http::get_room))
    })
    .bind(bind_addr)?
    .run()
    .await
}
