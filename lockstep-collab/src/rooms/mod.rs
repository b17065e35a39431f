mod control;
mod playback;
mod room;

use std::sync::Arc;

use log::info;

pub use control::*;
pub use playback::*;
pub use room::*;

use crate::{CoordinatorContext, CoordinatorError, Database, NewRoom};

/// Creates, restores, and looks up room sessions
pub struct RoomManager<Db> {
    context: CoordinatorContext<Db>,
}

impl<Db> RoomManager<Db>
where
    Db: Database,
{
    pub fn new(context: &CoordinatorContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Restores the rooms from the database on init
    pub async fn restore(&self) -> Result<(), CoordinatorError> {
        let rooms = self.context.db_call(self.context.db.list_rooms()).await?;
        let amount = rooms.len();

        for data in rooms {
            let session = Arc::new(RoomSession::new(&self.context, data));
            self.context.rooms.insert(session.id(), session);
        }

        info!("Restored {amount} room(s)");
        Ok(())
    }

    /// Creates a new room, immediately joinable
    pub async fn create_room(
        &self,
        new_room: NewRoom,
    ) -> Result<Arc<RoomSession<Db>>, CoordinatorError> {
        let data = self.context.db_call(self.context.db.create_room(new_room)).await?;
        let session = Arc::new(RoomSession::new(&self.context, data));

        self.context.rooms.insert(session.id(), session.clone());

        info!("Created room {}", session.data().name);
        Ok(session)
    }

    pub fn room_by_id(&self, room_id: RoomId) -> Result<Arc<RoomSession<Db>>, CoordinatorError> {
        self.context
            .rooms
            .get(&room_id)
            .map(|r| r.value().clone())
            .ok_or(CoordinatorError::NotFound { resource: "room" })
    }

    /// Get all rooms in memory
    pub fn list_all(&self) -> Vec<Arc<RoomSession<Db>>> {
        self.context.rooms.iter().map(|r| r.value().clone()).collect()
    }
}
