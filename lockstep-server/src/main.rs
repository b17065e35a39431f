use std::{env, sync::Arc};

use lockstep_collab::{Coordinator, DatabaseError, PgDatabase};
use lockstep_server::{logging, run_server, ServerContext};
use log::{error, info};
use thiserror::Error;

#[derive(Debug, Error)]
enum StartupError {
    #[error("Could not initialize database: {0}")]
    Database(DatabaseError),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl StartupError {
    fn hint(&self) -> String {
        match self {
            StartupError::Database(_) => {
                "This is a database error. Make sure Postgres is reachable at DATABASE_URL and the migrations have run, then try again.".to_string()
            }
            StartupError::Fatal(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init_logger();

    if let Err(error) = run().await {
        error!("lockstep failed to start! Read the error below to troubleshoot the issue.");
        error!("{error}");
        error!("Hint: {}", error.hint());
    }
}

async fn run() -> Result<(), StartupError> {
    let database_url = env::var("DATABASE_URL")
        .map_err(|_| StartupError::Fatal("DATABASE_URL is not set".to_string()))?;

    info!("Connecting to database...");
    let db = PgDatabase::new(&database_url)
        .await
        .map_err(StartupError::Database)?;

    let coordinator = Arc::new(Coordinator::new(db));

    info!("Restoring rooms...");
    coordinator
        .rooms
        .restore()
        .await
        .map_err(|e| StartupError::Fatal(e.to_string()))?;

    info!("Initialized successfully.");

    run_server(ServerContext { coordinator })
        .await
        .map_err(|e| StartupError::Fatal(e.to_string()))
}
