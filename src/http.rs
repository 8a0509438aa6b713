//! The HTTP rooms surface: `GET /api/rooms` and `GET /api/rooms/:roomId`.
//!
//! Explicitly out of scope for the core per the specification's Purpose &
//! Scope, but still a required external interface — kept intentionally
//! thin: no templating, no static file serving, just a read-only snapshot
//! of the registry.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use signal_proto::RoomId;

use crate::registry::Registry;

#[derive(Serialize)]
struct ParticipantView {
    user_id: String,
    nickname: String,
}

#[derive(Serialize)]
struct RoomView {
    room_id: String,
    participant_count: usize,
    participants: Vec<ParticipantView>,
}

#[derive(Serialize)]
struct RoomsResponse {
    rooms: Vec<RoomView>,
    count: usize,
}

impl From<(RoomId, Vec<signal_proto::MemberInfo>)> for RoomView {
    fn from((room_id, members): (RoomId, Vec<signal_proto::MemberInfo>)) -> Self {
        Self {
            room_id: room_id.0,
            participant_count: members.len(),
            participants: members
                .into_iter()
                .map(|m| ParticipantView {
                    user_id: m.user_id.0,
                    nickname: m.nickname,
                })
                .collect(),
        }
    }
}

pub async fn list_rooms(registry: web::Data<std::sync::Arc<Registry>>) -> HttpResponse {
    let rooms: Vec<RoomView> = registry
        .rooms_snapshot()
        .await
        .into_iter()
        .map(RoomView::from)
        .collect();
    let count = rooms.len();
    HttpResponse::Ok().json(RoomsResponse { rooms, count })
}

pub async fn get_room(
    registry: web::Data<std::sync::Arc<Registry>>,
    path: web::Path<String>,
) -> HttpResponse {
    let room_id = RoomId(path.into_inner());
    match registry.room_snapshot(&room_id).await {
        Some(members) => HttpResponse::Ok().json(RoomView::from((room_id, members))),
        None => HttpResponse::NotFound().finish(),
    }
}
