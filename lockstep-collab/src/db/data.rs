use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A watch party room
#[derive(Debug, Clone, FromRow)]
pub struct RoomData {
    pub id: PrimaryKey,
    pub name: String,
    /// Join secret checked at the gateway before the socket upgrade, if set
    pub secret: Option<String>,
    pub active: bool,
    pub host_only_control: bool,
}

/// A viewer present in a room.
/// Note: rows live only as long as the owning connection. Rows orphaned by an
/// abrupt socket drop are reconciled on the next join to the room.
#[derive(Debug, Clone, FromRow)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub room_id: PrimaryKey,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
}

/// A chat message, replayed in full history to joiners
#[derive(Debug, Clone, FromRow)]
pub struct MessageData {
    pub id: PrimaryKey,
    pub content: String,
    pub user_id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}

/// A shared video descriptor.
/// Note: `room_id` and `info_hash` are unique together.
#[derive(Debug, Clone, FromRow)]
pub struct VideoData {
    pub id: PrimaryKey,
    pub name: String,
    /// The content descriptor, relayed to peers verbatim
    pub magnet_uri: String,
    /// Content-addressed identifier used to deduplicate shares
    pub info_hash: String,
    pub size: i64,
    pub room_id: PrimaryKey,
    pub uploader_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}
