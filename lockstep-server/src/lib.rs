mod context;
mod docs;
mod errors;
mod gateway;
mod rooms;
mod schemas;

pub mod logging;

pub use context::ServerContext;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9070;

pub type Router = axum::Router<ServerContext>;

/// Starts the lockstep server
pub async fn run_server(context: ServerContext) -> Result<(), std::io::Error> {
    let port = env::var("LOCKSTEP_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/rooms", rooms::router())
        .nest("/gateway", gateway::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    info!("Listening on {addr}");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, root_router.into_make_service()).await
}
