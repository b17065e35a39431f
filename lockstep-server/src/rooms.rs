use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json,
};
use lockstep_collab::{NewRoom, Room, ToSerialized};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewRoomSchema, ValidatedJson},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    responses(
        (status = 200, description = "The rooms known to this instance")
    )
)]
pub(crate) async fn list_rooms(State(context): State<ServerContext>) -> Json<Vec<Room>> {
    let rooms: Vec<Room> = context
        .coordinator
        .rooms
        .list_all()
        .into_iter()
        .map(|r| r.data().to_serialized())
        .collect();

    Json(rooms)
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "The room id")
    ),
    responses(
        (status = 200, description = "The room"),
        (status = 404, description = "Room does not exist")
    )
)]
pub(crate) async fn room(
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Room>> {
    let room = context.coordinator.rooms.room_by_id(room_id)?;

    Ok(Json(room.data().to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    responses(
        (status = 200, description = "The created room, immediately joinable"),
        (status = 400, description = "Request body is invalid")
    )
)]
pub(crate) async fn create_room(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .coordinator
        .rooms
        .create_room(NewRoom {
            name: body.name,
            secret: body.secret,
        })
        .await?;

    Ok(Json(room.data().to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms))
        .route("/", post(create_room))
        .route("/:id", get(room))
}
