use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) => match e {
                DatabaseError::NotFound { .. } => Ok(()),
                e => Err(e),
            },
        }
    }
}

/// Represents a type that can fetch and store lockstep records
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn set_room_host_only_control(
        &self,
        room_id: PrimaryKey,
        host_only_control: bool,
    ) -> Result<RoomData>;

    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn users_by_room(&self, room_id: PrimaryKey) -> Result<Vec<UserData>>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_username(&self, user_id: PrimaryKey, username: &str) -> Result<UserData>;
    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()>;

    async fn messages_by_room(&self, room_id: PrimaryKey) -> Result<Vec<MessageData>>;
    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData>;

    async fn video_by_id(&self, video_id: PrimaryKey) -> Result<VideoData>;
    async fn videos_by_room(&self, room_id: PrimaryKey) -> Result<Vec<VideoData>>;
    async fn video_by_info_hash(&self, room_id: PrimaryKey, info_hash: &str) -> Result<VideoData>;
    async fn create_video(&self, new_video: NewVideo) -> Result<VideoData>;
    async fn delete_video(&self, video_id: PrimaryKey) -> Result<()>;
}

#[derive(Debug)]
pub struct NewRoom {
    pub name: String,
    pub secret: Option<String>,
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub room_id: PrimaryKey,
    pub is_host: bool,
}

#[derive(Debug)]
pub struct NewMessage {
    pub content: String,
    pub user_id: PrimaryKey,
    pub room_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewVideo {
    pub name: String,
    pub magnet_uri: String,
    pub info_hash: String,
    pub size: i64,
    pub room_id: PrimaryKey,
    pub uploader_id: PrimaryKey,
}
