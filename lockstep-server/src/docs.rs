use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::rooms::list_rooms,
        crate::rooms::create_room,
        crate::rooms::room,
    ),
    components(schemas(crate::schemas::NewRoomSchema)),
    info(
        description = "lockstep-server exposes endpoints to create watch party rooms and open gateway connections"
    )
)]
pub struct ApiDoc;

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
