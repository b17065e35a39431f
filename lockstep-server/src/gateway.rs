use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use log::debug;
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;

use crate::{context::ServerContext, Router};

#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    room: Option<i32>,
    secret: Option<String>,
}

/// Upgrades a gateway connection. When `room` references a secret-bearing
/// room, the secret is checked here, before the socket upgrade; the
/// coordinator never sees secrets.
async fn gateway(
    State(context): State<ServerContext>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(room_id) = params.room {
        let Ok(room) = context.coordinator.rooms.room_by_id(room_id) else {
            return (StatusCode::NOT_FOUND, "Room does not exist").into_response();
        };

        let data = room.data();

        if data.secret.is_some() && data.secret != params.secret {
            return (StatusCode::FORBIDDEN, "Wrong room secret").into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, context))
}

async fn handle_socket(socket: WebSocket, context: ServerContext) {
    let (mut sink, mut stream) = socket.split();
    let (sender, mut outbound) = unbounded_channel::<String>();

    let connection_id = context.coordinator.register_connection(sender);
    debug!("Gateway connection {connection_id} opened");

    // Outbound frames flow through one ordered channel per connection
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                context.coordinator.handle_message(connection_id, &text).await
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    // The single exit point of the read loop, so teardown runs exactly once
    // whether the close was clean or abrupt
    context.coordinator.handle_disconnect(connection_id).await;
    writer.abort();

    debug!("Gateway connection {connection_id} closed");
}

pub fn router() -> Router {
    Router::new().route("/", get(gateway))
}
