use std::sync::Arc;

use axum::extract::FromRef;
use lockstep_collab::{Coordinator, PgDatabase};

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub coordinator: Arc<Coordinator<PgDatabase>>,
}
