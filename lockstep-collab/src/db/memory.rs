use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{
    Database, DatabaseError, MessageData, NewMessage, NewRoom, NewUser, NewVideo, PrimaryKey,
    Result, RoomData, UserData, VideoData,
};

/// An in-memory [Database], backing tests and storage-less local runs
#[derive(Default)]
pub struct MemoryDatabase {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    last_id: PrimaryKey,
    rooms: HashMap<PrimaryKey, RoomData>,
    users: HashMap<PrimaryKey, UserData>,
    messages: Vec<MessageData>,
    videos: HashMap<PrimaryKey, VideoData>,
}

impl Inner {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.inner
            .lock()
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        let mut rooms: Vec<_> = self.inner.lock().rooms.values().cloned().collect();
        rooms.sort_by_key(|r| r.id);

        Ok(rooms)
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut inner = self.inner.lock();

        let room = RoomData {
            id: inner.next_id(),
            name: new_room.name,
            secret: new_room.secret,
            active: true,
            host_only_control: false,
        };

        inner.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn set_room_host_only_control(
        &self,
        room_id: PrimaryKey,
        host_only_control: bool,
    ) -> Result<RoomData> {
        let mut inner = self.inner.lock();

        let room = inner
            .rooms
            .get_mut(&room_id)
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })?;

        room.host_only_control = host_only_control;
        Ok(room.clone())
    }

    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.inner
            .lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn users_by_room(&self, room_id: PrimaryKey) -> Result<Vec<UserData>> {
        let mut users: Vec<_> = self
            .inner
            .lock()
            .users
            .values()
            .filter(|u| u.room_id == room_id)
            .cloned()
            .collect();

        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut inner = self.inner.lock();

        let user = UserData {
            id: inner.next_id(),
            username: new_user.username,
            room_id: new_user.room_id,
            is_host: new_user.is_host,
            joined_at: Utc::now(),
        };

        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_username(&self, user_id: PrimaryKey, username: &str) -> Result<UserData> {
        let mut inner = self.inner.lock();

        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })?;

        user.username = username.to_string();
        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        self.inner
            .lock()
            .users
            .remove(&user_id)
            .map(|_| ())
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn messages_by_room(&self, room_id: PrimaryKey) -> Result<Vec<MessageData>> {
        Ok(self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        let mut inner = self.inner.lock();

        let message = MessageData {
            id: inner.next_id(),
            content: new_message.content,
            user_id: new_message.user_id,
            room_id: new_message.room_id,
            created_at: Utc::now(),
        };

        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn video_by_id(&self, video_id: PrimaryKey) -> Result<VideoData> {
        self.inner
            .lock()
            .videos
            .get(&video_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "video",
                identifier: "id",
            })
    }

    async fn videos_by_room(&self, room_id: PrimaryKey) -> Result<Vec<VideoData>> {
        let mut videos: Vec<_> = self
            .inner
            .lock()
            .videos
            .values()
            .filter(|v| v.room_id == room_id)
            .cloned()
            .collect();

        videos.sort_by_key(|v| v.id);
        Ok(videos)
    }

    async fn video_by_info_hash(&self, room_id: PrimaryKey, info_hash: &str) -> Result<VideoData> {
        self.inner
            .lock()
            .videos
            .values()
            .find(|v| v.room_id == room_id && v.info_hash == info_hash)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "video",
                identifier: "room_id:info_hash",
            })
    }

    async fn create_video(&self, new_video: NewVideo) -> Result<VideoData> {
        let mut inner = self.inner.lock();

        let conflicting = inner
            .videos
            .values()
            .any(|v| v.room_id == new_video.room_id && v.info_hash == new_video.info_hash);

        if conflicting {
            return Err(DatabaseError::Conflict {
                resource: "video",
                field: "room_id:info_hash",
                value: format!("{}:{}", new_video.room_id, new_video.info_hash),
            });
        }

        let video = VideoData {
            id: inner.next_id(),
            name: new_video.name,
            magnet_uri: new_video.magnet_uri,
            info_hash: new_video.info_hash,
            size: new_video.size,
            room_id: new_video.room_id,
            uploader_id: new_video.uploader_id,
            created_at: Utc::now(),
        };

        inner.videos.insert(video.id, video.clone());
        Ok(video)
    }

    async fn delete_video(&self, video_id: PrimaryKey) -> Result<()> {
        self.inner
            .lock()
            .videos
            .remove(&video_id)
            .map(|_| ())
            .ok_or(DatabaseError::NotFound {
                resource: "video",
                identifier: "id",
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_video_dedup_lookup() {
        let db = MemoryDatabase::default();

        let room = db
            .create_room(NewRoom {
                name: "movie night".to_string(),
                secret: None,
            })
            .await
            .unwrap();

        let video = db
            .create_video(NewVideo {
                name: "big buck bunny".to_string(),
                magnet_uri: "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c"
                    .to_string(),
                info_hash: "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c".to_string(),
                size: 276_134_947,
                room_id: room.id,
                uploader_id: 1,
            })
            .await
            .unwrap();

        let found = db
            .video_by_info_hash(room.id, "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c")
            .await
            .unwrap();

        assert_eq!(found.id, video.id, "lookup should resolve to the record");

        let missing = db.video_by_info_hash(room.id, "ffffffffffffffffffffffffffffffffffffffff");
        assert!(
            matches!(missing.await, Err(DatabaseError::NotFound { .. })),
            "unknown hash should not resolve"
        );
    }

    #[tokio::test]
    async fn test_duplicate_video_conflicts() {
        let db = MemoryDatabase::default();

        let room = db
            .create_room(NewRoom {
                name: "movie night".to_string(),
                secret: None,
            })
            .await
            .unwrap();

        let new_video = || NewVideo {
            name: "sintel".to_string(),
            magnet_uri: "magnet:?xt=urn:btih:08ada5a7a6183aae1e09d831df6748d566095a10".to_string(),
            info_hash: "08ada5a7a6183aae1e09d831df6748d566095a10".to_string(),
            size: 129_241_752,
            room_id: room.id,
            uploader_id: 1,
        };

        db.create_video(new_video()).await.unwrap();

        assert!(
            matches!(
                db.create_video(new_video()).await,
                Err(DatabaseError::Conflict { .. })
            ),
            "second create for the same content should conflict"
        );
    }
}
