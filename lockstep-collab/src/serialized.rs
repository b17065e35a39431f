//! Wire-safe versions of the persisted records, along with the From-like
//! trait used to produce them. The join secret never crosses the wire.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{MessageData, PrimaryKey, RoomData, UserData, VideoData};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: PrimaryKey,
    pub name: String,
    pub active: bool,
    pub host_only_control: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: PrimaryKey,
    pub username: String,
    pub room_id: PrimaryKey,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: PrimaryKey,
    pub content: String,
    pub user_id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}

/// A chat message paired with its author, as broadcast to a room
#[derive(Debug, Clone, Serialize)]
pub struct MessageWithUser {
    #[serde(flatten)]
    pub message: Message,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: PrimaryKey,
    pub name: String,
    pub magnet_uri: String,
    pub info_hash: String,
    pub size: i64,
    pub room_id: PrimaryKey,
    pub uploader_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}

/// An outstanding control request, as shown to host UIs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingControlRequest {
    pub user_id: PrimaryKey,
    pub username: String,
    pub requested_at: DateTime<Utc>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<Room> for RoomData {
    fn to_serialized(&self) -> Room {
        Room {
            id: self.id,
            name: self.name.clone(),
            active: self.active,
            host_only_control: self.host_only_control,
        }
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            room_id: self.room_id,
            is_host: self.is_host,
            joined_at: self.joined_at,
        }
    }
}

impl ToSerialized<Message> for MessageData {
    fn to_serialized(&self) -> Message {
        Message {
            id: self.id,
            content: self.content.clone(),
            user_id: self.user_id,
            room_id: self.room_id,
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Video> for VideoData {
    fn to_serialized(&self) -> Video {
        Video {
            id: self.id,
            name: self.name.clone(),
            magnet_uri: self.magnet_uri.clone(),
            info_hash: self.info_hash.clone(),
            size: self.size,
            room_id: self.room_id,
            uploader_id: self.uploader_id,
            created_at: self.created_at,
        }
    }
}
